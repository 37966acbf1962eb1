//! Inventory products and stock lots, read by the alerting sweeps.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::identifiers::{ProductId, StockItemId, WarehouseId};

/// Default look-ahead window of the near-expiry sweep.
pub const DEFAULT_EXPIRY_LEAD_DAYS: i64 = 30;

/// Longest accepted look-ahead window, ten years.
pub const MAX_EXPIRY_LEAD_DAYS: i64 = 3650;

/// A catalogue product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Configured minimum stock; 0 disables the check
    pub min_stock: i64,
    pub active: bool,
}

impl Product {
    /// Whether `total_stock` is under the configured minimum
    pub fn is_low_stock(&self, total_stock: i64) -> bool {
        self.active && self.min_stock > 0 && total_stock < self.min_stock
    }
}

/// A stock lot in a warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub lot: Option<String>,
    pub quantity: i64,
    pub expires_on: Option<NaiveDate>,
}

impl StockItem {
    /// Whether the lot expires within `lead_days` of `today` and is neither
    /// empty nor already expired
    pub fn is_near_expiry(&self, today: NaiveDate, lead_days: i64) -> bool {
        let (Some(expires_on), Ok(until)) = (self.expires_on, expiry_window_end(today, lead_days))
        else {
            return false;
        };
        self.quantity > 0 && expires_on >= today && expires_on <= until
    }

    /// Days left until expiry, if the lot has a date
    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expires_on.map(|date| (date - today).num_days())
    }
}

/// A product together with its stock consolidated over every warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStock {
    pub product: Product,
    pub total_stock: i64,
}

impl ProductStock {
    pub fn is_low(&self) -> bool {
        self.product.is_low_stock(self.total_stock)
    }

    /// Units missing to reach the minimum
    pub fn shortfall(&self) -> i64 {
        (self.product.min_stock - self.total_stock).max(0)
    }
}

/// A stock lot joined with the name of its product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiringLot {
    pub item: StockItem,
    pub product_name: String,
}

/// Validate the near-expiry look-ahead window
pub fn validate_lead_days(days: i64) -> DomainResult<i64> {
    if (1..=MAX_EXPIRY_LEAD_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(DomainError::InvalidLeadDays(days))
    }
}

/// Last day of the window opening on `today`, inclusive
pub fn expiry_window_end(today: NaiveDate, lead_days: i64) -> DomainResult<NaiveDate> {
    let days = validate_lead_days(lead_days)?;
    today
        .checked_add_signed(Duration::days(days))
        .ok_or(DomainError::InvalidLeadDays(days))
}
