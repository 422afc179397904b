use std::collections::HashMap;

use sqlx::Row;
use sqlx::Connection;

use crate::error::{ServiceError, ServiceResult};
use crate::models::Package;

use super::{to_db_id, to_id, DatabaseConnection};

impl DatabaseConnection {
    async fn load_packages(&mut self, id: Option<u64>) -> ServiceResult<Vec<Package>> {
        let rows = sqlx::query(
            r#"SELECT id, name, description, price_per_guest_cents, active FROM packages
            WHERE $1::BIGINT IS NULL OR id = $1
            ORDER BY name"#,
        )
        .bind(id.map(to_db_id))
        .fetch_all(&mut *self.connection)
        .await?;

        let item_rows = sqlx::query(
            r#"SELECT package_id, menu_item_id FROM package_items
            WHERE $1::BIGINT IS NULL OR package_id = $1
            ORDER BY menu_item_id"#,
        )
        .bind(id.map(to_db_id))
        .fetch_all(&mut *self.connection)
        .await?;

        let mut items = HashMap::<u64, Vec<u64>>::new();
        for row in item_rows.iter() {
            items
                .entry(to_id(row.try_get("package_id")?))
                .or_default()
                .push(to_id(row.try_get("menu_item_id")?));
        }

        let mut packages = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let id = to_id(row.try_get("id")?);
            packages.push(Package {
                id,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                price_per_guest_cents: row.try_get("price_per_guest_cents")?,
                active: row.try_get("active")?,
                menu_item_ids: items.remove(&id).unwrap_or_default(),
            });
        }

        Ok(packages)
    }

    pub async fn get_all_packages(&mut self) -> ServiceResult<Vec<Package>> {
        self.load_packages(None).await
    }

    pub async fn get_package_by_id(&mut self, id: u64) -> ServiceResult<Option<Package>> {
        Ok(self.load_packages(Some(id)).await?.pop())
    }

    /// Stores the package and replaces its included menu items.
    pub async fn store_package(&mut self, package: Package) -> ServiceResult<Package> {
        let mut tx = self.connection.begin().await?;

        let id: i64 = if package.id == 0 {
            sqlx::query_scalar(
                r#"INSERT INTO packages (name, description, price_per_guest_cents, active)
                VALUES ($1, $2, $3, $4) RETURNING id"#,
            )
            .bind(&package.name)
            .bind(&package.description)
            .bind(package.price_per_guest_cents)
            .bind(package.active)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query_scalar(
                r#"UPDATE packages SET name = $2, description = $3, price_per_guest_cents = $4, active = $5
                WHERE id = $1 RETURNING id"#,
            )
            .bind(to_db_id(package.id))
            .bind(&package.name)
            .bind(&package.description)
            .bind(package.price_per_guest_cents)
            .bind(package.active)
            .fetch_one(&mut *tx)
            .await?
        };

        sqlx::query("DELETE FROM package_items WHERE package_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let item_ids: Vec<i64> = package.menu_item_ids.iter().copied().map(to_db_id).collect();
        sqlx::query(
            r#"INSERT INTO package_items (package_id, menu_item_id)
            SELECT $1, item_id FROM UNNEST($2::BIGINT[]) AS item_id
            ON CONFLICT DO NOTHING"#,
        )
        .bind(id)
        .bind(&item_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_package_by_id(to_id(id))
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn delete_package(&mut self, id: u64) -> ServiceResult<()> {
        sqlx::query("DELETE FROM packages WHERE id = $1")
            .bind(to_db_id(id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }
}
