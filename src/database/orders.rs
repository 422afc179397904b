use std::collections::HashMap;

use sqlx::postgres::PgRow;
use sqlx::{Connection, Row};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    KitchenStatus, KitchenTicket, NewOrder, Order, OrderItem, OrderStatus, SessionStatus,
};

use super::{to_db_id, to_id, DatabaseConnection};

const ITEM_COLUMNS: &str = "order_items.id, order_items.order_id, order_items.menu_item_id, order_items.name, \
    order_items.unit_price_cents, order_items.quantity, order_items.note, \
    order_items.included_in_package, order_items.kitchen_status";

fn row_to_item(row: &PgRow) -> ServiceResult<OrderItem> {
    let status: String = row.try_get("kitchen_status")?;
    Ok(OrderItem {
        id: to_id(row.try_get("id")?),
        order_id: to_id(row.try_get("order_id")?),
        menu_item_id: row.try_get::<Option<i64>, _>("menu_item_id")?.map(to_id),
        name: row.try_get("name")?,
        unit_price_cents: row.try_get("unit_price_cents")?,
        quantity: row.try_get("quantity")?,
        note: row.try_get("note")?,
        included_in_package: row.try_get("included_in_package")?,
        kitchen_status: status.parse()?,
    })
}

impl DatabaseConnection {
    async fn load_orders(&mut self, rows: Vec<PgRow>) -> ServiceResult<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<Result<Vec<i64>, _>>()?;

        let item_rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&mut *self.connection)
        .await?;

        let mut items = HashMap::<u64, Vec<OrderItem>>::new();
        for row in item_rows.iter() {
            let item = row_to_item(row)?;
            items.entry(item.order_id).or_default().push(item);
        }

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let id = to_id(row.try_get("id")?);
            let status: String = row.try_get("status")?;
            orders.push(Order {
                id,
                session_id: to_id(row.try_get("session_id")?),
                status: status.parse()?,
                note: row.try_get("note")?,
                created_at: row.try_get("created_at")?,
                items: items.remove(&id).unwrap_or_default(),
            });
        }

        Ok(orders)
    }

    pub async fn get_orders_by_session(&mut self, session_id: u64) -> ServiceResult<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT id, session_id, status, note, created_at FROM orders WHERE session_id = $1 ORDER BY created_at, id",
        )
        .bind(to_db_id(session_id))
        .fetch_all(&mut *self.connection)
        .await?;

        self.load_orders(rows).await
    }

    pub async fn get_order_by_id(&mut self, id: u64) -> ServiceResult<Option<Order>> {
        let rows = sqlx::query(
            "SELECT id, session_id, status, note, created_at FROM orders WHERE id = $1",
        )
        .bind(to_db_id(id))
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(self.load_orders(rows).await?.pop())
    }

    pub async fn get_order_item_by_id(&mut self, id: u64) -> ServiceResult<Option<OrderItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_items.id = $1"
        ))
        .bind(to_db_id(id))
        .fetch_optional(&mut *self.connection)
        .await?;

        row.as_ref().map(row_to_item).transpose()
    }

    /// Inserts the order with all of its items in one transaction.
    pub async fn create_order(&mut self, order: NewOrder) -> ServiceResult<Order> {
        let mut tx = self.connection.begin().await?;

        let order_id: i64 = sqlx::query_scalar(
            "INSERT INTO orders (session_id, status, note) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(to_db_id(order.session_id))
        .bind(OrderStatus::Pending.as_str())
        .bind(&order.note)
        .fetch_one(&mut *tx)
        .await?;

        for item in order.items.iter() {
            sqlx::query(
                r#"INSERT INTO order_items
                    (order_id, menu_item_id, name, unit_price_cents, quantity, note, included_in_package, kitchen_status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
            )
            .bind(order_id)
            .bind(to_db_id(item.menu_item_id))
            .bind(&item.name)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .bind(&item.note)
            .bind(item.included_in_package)
            .bind(KitchenStatus::Waiting.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_order_by_id(to_id(order_id))
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Moves an item to `status` and re-derives the status of its order.
    ///
    /// The update only applies if the item is still in `expected`, so two
    /// concurrent updates cannot both advance the same step.
    pub async fn update_order_item_status(
        &mut self,
        item_id: u64,
        expected: KitchenStatus,
        status: KitchenStatus,
    ) -> ServiceResult<Order> {
        let mut tx = self.connection.begin().await?;

        let order_id: Option<i64> = sqlx::query_scalar(
            r#"UPDATE order_items SET kitchen_status = $3
            WHERE id = $1 AND kitchen_status = $2
                AND EXISTS (
                    SELECT 1 FROM orders
                        JOIN dining_sessions ON dining_sessions.id = orders.session_id
                    WHERE orders.id = order_items.order_id
                        AND orders.status <> 'Cancelled'
                        AND dining_sessions.status = 'Open'
                )
            RETURNING order_id"#,
        )
        .bind(to_db_id(item_id))
        .bind(expected.as_str())
        .bind(status.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let order_id = match order_id {
            Some(order_id) => order_id,
            None => {
                drop(tx);
                return Err(self.item_status_rejection(item_id).await?);
            }
        };

        let statuses: Vec<String> =
            sqlx::query_scalar("SELECT kitchen_status FROM order_items WHERE order_id = $1")
                .bind(order_id)
                .fetch_all(&mut *tx)
                .await?;
        let statuses = statuses
            .iter()
            .map(|s| s.parse::<KitchenStatus>())
            .collect::<Result<Vec<_>, _>>()?;

        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1 AND status <> 'Cancelled'")
            .bind(order_id)
            .bind(OrderStatus::derive(&statuses).as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get_order_by_id(to_id(order_id))
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Why a kitchen status update did not apply to `item_id`.
    async fn item_status_rejection(&mut self, item_id: u64) -> ServiceResult<ServiceError> {
        let row = sqlx::query(
            r#"SELECT orders.status AS order_status, dining_sessions.status AS session_status
            FROM order_items
                JOIN orders ON orders.id = order_items.order_id
                JOIN dining_sessions ON dining_sessions.id = orders.session_id
            WHERE order_items.id = $1"#,
        )
        .bind(to_db_id(item_id))
        .fetch_optional(&mut *self.connection)
        .await?;

        let Some(row) = row else {
            return Ok(ServiceError::NotFound);
        };

        let order_status: OrderStatus = row.try_get::<String, _>("order_status")?.parse()?;
        let session_status: SessionStatus = row.try_get::<String, _>("session_status")?.parse()?;

        Ok(if order_status == OrderStatus::Cancelled {
            ServiceError::BadRequest("order_cancelled")
        } else if session_status != SessionStatus::Open {
            ServiceError::BadRequest("session_closed")
        } else {
            ServiceError::BadRequest("invalid_status_transition")
        })
    }

    /// Cancels the order if the kitchen has not started on any of its items.
    pub async fn cancel_order(&mut self, id: u64) -> ServiceResult<bool> {
        let result = sqlx::query(
            r#"UPDATE orders SET status = 'Cancelled'
            WHERE id = $1 AND status IN ('Pending', 'Preparing')
                AND NOT EXISTS (
                    SELECT 1 FROM order_items
                    WHERE order_items.order_id = $1 AND order_items.kitchen_status <> 'WAITING'
                )"#,
        )
        .bind(to_db_id(id))
        .execute(&mut *self.connection)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_kitchen_queue(&mut self) -> ServiceResult<Vec<KitchenTicket>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {ITEM_COLUMNS}, orders.session_id, orders.created_at AS ordered_at, dining_tables.name AS table_name
            FROM order_items
                JOIN orders ON orders.id = order_items.order_id
                JOIN dining_sessions ON dining_sessions.id = orders.session_id
                JOIN dining_tables ON dining_tables.id = dining_sessions.table_id
            WHERE dining_sessions.status = 'Open'
                AND orders.status <> 'Cancelled'
                AND order_items.kitchen_status <> 'SERVED'
            ORDER BY orders.created_at, order_items.id"#
        ))
        .fetch_all(&mut *self.connection)
        .await?;

        rows.iter()
            .map(|row| -> ServiceResult<KitchenTicket> {
                Ok(KitchenTicket {
                    item: row_to_item(row)?,
                    session_id: to_id(row.try_get("session_id")?),
                    table_name: row.try_get("table_name")?,
                    ordered_at: row.try_get("ordered_at")?,
                })
            })
            .collect()
    }
}
