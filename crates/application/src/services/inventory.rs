//! Inventory alerting collaborators shared by the low-stock and near-expiry sweeps.

use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use lms_pipeline_common::{Clock, InventoryConfig};
use lms_pipeline_domain::{
    inventory::{expiry_window_end, ExpiringLot, ProductStock},
    notification::{dedup_cutoff, DedupKey, NotificationDraft, NotificationType},
    user::User,
};

use crate::ports::{InventoryRepositoryPort, NotificationRepositoryPort, UserRepositoryPort};
use crate::ApplicationResult;

/// Email fragment identifying administrators when no user holds an audience role
const ADMIN_EMAIL_FRAGMENT: &str = "admin";

/// Finds inventory violations, resolves who hears about them and writes the
/// deduplicated notifications
pub struct InventoryAlertService {
    inventory: Arc<dyn InventoryRepositoryPort>,
    users: Arc<dyn UserRepositoryPort>,
    notifications: Arc<dyn NotificationRepositoryPort>,
    clock: Arc<dyn Clock>,
    config: InventoryConfig,
}

impl InventoryAlertService {
    pub fn new(
        inventory: Arc<dyn InventoryRepositoryPort>,
        users: Arc<dyn UserRepositoryPort>,
        notifications: Arc<dyn NotificationRepositoryPort>,
        clock: Arc<dyn Clock>,
        config: InventoryConfig,
    ) -> Self {
        Self {
            inventory,
            users,
            notifications,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    /// Current date according to the injected clock
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Active products whose consolidated stock is under their minimum
    pub async fn low_stock_products(&self) -> ApplicationResult<Vec<ProductStock>> {
        let stock = self.inventory.list_product_stock().await?;
        Ok(stock.into_iter().filter(ProductStock::is_low).collect())
    }

    /// Lots with stock expiring between `today` and `today + days_ahead`, both inclusive
    pub async fn near_expiry_lots(
        &self,
        days_ahead: i64,
        today: NaiveDate,
    ) -> ApplicationResult<Vec<ExpiringLot>> {
        let until = expiry_window_end(today, days_ahead)?;

        let lots = self
            .inventory
            .list_lots_expiring_between(today, until)
            .await?;

        Ok(lots
            .into_iter()
            .filter(|lot| lot.item.is_near_expiry(today, days_ahead))
            .collect())
    }

    /// Users that receive inventory notifications.
    ///
    /// Holders of the configured roles; failing that, users whose email
    /// mentions `admin`; failing that, any single user. Empty only when there
    /// are no users at all.
    pub async fn resolve_audience(&self) -> ApplicationResult<Vec<User>> {
        let by_role = self
            .users
            .list_with_any_role(&self.config.audience_roles)
            .await?;
        if !by_role.is_empty() {
            return Ok(by_role);
        }

        let by_email = self
            .users
            .list_with_email_containing(ADMIN_EMAIL_FRAGMENT)
            .await?;
        if !by_email.is_empty() {
            debug!(count = by_email.len(), "No user holds an audience role, using admin emails");
            return Ok(by_email);
        }

        match self.users.first().await? {
            Some(user) => {
                warn!(user_id = %user.id, "No inventory audience configured, falling back to a single user");
                Ok(vec![user])
            }
            None => Ok(Vec::new()),
        }
    }

    /// Whether a notification of `kind` for `key` was already written inside
    /// the dedup window
    pub async fn already_notified(
        &self,
        kind: NotificationType,
        key: &DedupKey,
    ) -> ApplicationResult<bool> {
        let since = dedup_cutoff(self.clock.now(), self.config.dedup_window_hours);
        self.notifications.exists_since(kind, key, since).await
    }

    /// Append one notification per audience member; returns how many were written
    pub async fn notify_audience(
        &self,
        audience: &[User],
        draft: &NotificationDraft,
    ) -> ApplicationResult<usize> {
        let now = self.clock.now();
        for user in audience {
            self.notifications
                .append(draft.addressed_to(user.id, now))
                .await?;
        }
        Ok(audience.len())
    }
}

/// Notification for one product under its minimum stock
pub fn low_stock_draft(stock: &ProductStock) -> NotificationDraft {
    NotificationDraft {
        notification_type: NotificationType::LowStock,
        dedup_key: DedupKey::product(stock.product.id),
        title: format!("Stock bajo: {}", stock.product.name),
        message: format!(
            "El producto {} tiene {} unidades, por debajo del mínimo de {}.",
            stock.product.name, stock.total_stock, stock.product.min_stock
        ),
        payload: json!({
            "product_id": stock.product.id,
            "product_name": stock.product.name,
            "total_stock": stock.total_stock,
            "min_stock": stock.product.min_stock,
            "shortfall": stock.shortfall(),
        }),
    }
}

/// One notification covering every lot expiring inside the window
pub fn near_expiry_draft(days_ahead: i64, lots: &[ExpiringLot], today: NaiveDate) -> NotificationDraft {
    let items: Vec<serde_json::Value> = lots
        .iter()
        .map(|lot| {
            json!({
                "stock_item_id": lot.item.id,
                "product_id": lot.item.product_id,
                "product_name": lot.product_name,
                "warehouse_id": lot.item.warehouse_id,
                "lot": lot.item.lot,
                "quantity": lot.item.quantity,
                "expires_on": lot.item.expires_on,
                "days_left": lot.item.days_until_expiry(today),
            })
        })
        .collect();

    NotificationDraft {
        notification_type: NotificationType::NearExpiry,
        dedup_key: DedupKey::lead_days(days_ahead),
        title: "Productos próximos a vencer".to_string(),
        message: format!(
            "{} lote(s) vencen en los próximos {} días.",
            lots.len(),
            days_ahead
        ),
        payload: json!({
            "days_ahead": days_ahead,
            "lots": items,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_pipeline_domain::{
        inventory::{Product, StockItem},
        ProductId, StockItemId, WarehouseId,
    };

    #[test]
    fn test_low_stock_draft() {
        let stock = ProductStock {
            product: Product {
                id: ProductId::new(12),
                name: "Guantes de nitrilo".to_string(),
                min_stock: 50,
                active: true,
            },
            total_stock: 8,
        };

        let draft = low_stock_draft(&stock);
        assert_eq!(draft.dedup_key.as_str(), "product:12");
        assert_eq!(draft.payload["shortfall"], 42);
        assert!(draft.title.contains("Guantes de nitrilo"));
    }

    #[test]
    fn test_near_expiry_draft_uses_window_key() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let lots = vec![ExpiringLot {
            item: StockItem {
                id: StockItemId::new(3),
                product_id: ProductId::new(1),
                warehouse_id: WarehouseId::new(2),
                lot: Some("L-77".to_string()),
                quantity: 4,
                expires_on: NaiveDate::from_ymd_opt(2024, 3, 11),
            },
            product_name: "Alcohol en gel".to_string(),
        }];

        let draft = near_expiry_draft(30, &lots, today);
        assert_eq!(draft.dedup_key.as_str(), "days:30");
        assert_eq!(draft.payload["lots"][0]["days_left"], 10);
    }
}
