//! Inventory reads and the notification log.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use lms_pipeline_application::{
    ports::{InventoryRepositoryPort, NotificationRepositoryPort},
    ApplicationResult,
};
use lms_pipeline_domain::{
    inventory::{ExpiringLot, Product, ProductStock, StockItem},
    notification::{DedupKey, NewNotification, NotificationType},
    NotificationId, ProductId, StockItemId, WarehouseId,
};

use crate::Error;

/// PostgreSQL repository for `productos`, `stock_productos` and `notificaciones`.
pub struct PgInventoryRepository {
    pool: PgPool,
}

impl PgInventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryRepositoryPort for PgInventoryRepository {
    #[instrument(skip(self))]
    async fn list_product_stock(&self) -> ApplicationResult<Vec<ProductStock>> {
        let rows = sqlx::query(
            r#"
            SELECT
                p.id, p.nombre,
                p.stock_minimo::BIGINT AS stock_minimo,
                p.activo,
                COALESCE(SUM(s.cantidad), 0)::BIGINT AS stock_total
            FROM productos p
            LEFT JOIN stock_productos s ON s.producto_id = p.id
            WHERE p.activo = TRUE AND p.stock_minimo > 0
            GROUP BY p.id, p.nombre, p.stock_minimo, p.activo
            ORDER BY p.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut stock = Vec::with_capacity(rows.len());
        for row in &rows {
            stock.push(ProductStock {
                product: Product {
                    id: ProductId::new(row.try_get("id").map_err(Error::Database)?),
                    name: row.try_get("nombre").map_err(Error::Database)?,
                    min_stock: row.try_get("stock_minimo").map_err(Error::Database)?,
                    active: row.try_get("activo").map_err(Error::Database)?,
                },
                total_stock: row.try_get("stock_total").map_err(Error::Database)?,
            });
        }

        Ok(stock)
    }

    #[instrument(skip(self))]
    async fn list_lots_expiring_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> ApplicationResult<Vec<ExpiringLot>> {
        let rows = sqlx::query(
            r#"
            SELECT
                s.id, s.producto_id, s.almacen_id, s.lote,
                s.cantidad::BIGINT AS cantidad,
                s.fecha_vencimiento,
                p.nombre
            FROM stock_productos s
            JOIN productos p ON p.id = s.producto_id
            WHERE s.cantidad > 0
              AND s.fecha_vencimiento BETWEEN $1 AND $2
            ORDER BY s.fecha_vencimiento, s.id
            "#,
        )
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut lots = Vec::with_capacity(rows.len());
        for row in &rows {
            lots.push(ExpiringLot {
                item: StockItem {
                    id: StockItemId::new(row.try_get("id").map_err(Error::Database)?),
                    product_id: ProductId::new(row.try_get("producto_id").map_err(Error::Database)?),
                    warehouse_id: WarehouseId::new(row.try_get("almacen_id").map_err(Error::Database)?),
                    lot: row.try_get("lote").map_err(Error::Database)?,
                    quantity: row.try_get("cantidad").map_err(Error::Database)?,
                    expires_on: row.try_get("fecha_vencimiento").map_err(Error::Database)?,
                },
                product_name: row.try_get("nombre").map_err(Error::Database)?,
            });
        }

        Ok(lots)
    }
}

#[async_trait]
impl NotificationRepositoryPort for PgInventoryRepository {
    #[instrument(skip(self, notification), fields(user_id = %notification.user_id, kind = %notification.notification_type))]
    async fn append(&self, notification: NewNotification) -> ApplicationResult<NotificationId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO notificaciones (
                user_id, tipo, clave_dedup, titulo, mensaje, datos, leida, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
            RETURNING id
            "#,
        )
        .bind(notification.user_id.value())
        .bind(notification.notification_type.as_str())
        .bind(notification.dedup_key.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.payload)
        .bind(notification.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(notification_id = id, "Notification appended");
        Ok(NotificationId::new(id))
    }

    #[instrument(skip(self))]
    async fn exists_since(
        &self,
        kind: NotificationType,
        key: &DedupKey,
        since: DateTime<Utc>,
    ) -> ApplicationResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM notificaciones
                WHERE tipo = $1 AND clave_dedup = $2 AND created_at > $3
            )
            "#,
        )
        .bind(kind.as_str())
        .bind(key.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(exists)
    }
}
