use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{MenuCategory, MenuItem};

use super::{to_db_id, to_id, DatabaseConnection};

const ITEM_COLUMNS: &str = "id, category_id, name, description, price_cents, image_url, available";

fn row_to_category(row: &PgRow) -> ServiceResult<MenuCategory> {
    Ok(MenuCategory {
        id: to_id(row.try_get("id")?),
        name: row.try_get("name")?,
        position: row.try_get("position")?,
    })
}

fn row_to_item(row: &PgRow) -> ServiceResult<MenuItem> {
    Ok(MenuItem {
        id: to_id(row.try_get("id")?),
        category_id: row.try_get::<Option<i64>, _>("category_id")?.map(to_id),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price_cents: row.try_get("price_cents")?,
        image_url: row.try_get("image_url")?,
        available: row.try_get("available")?,
    })
}

impl DatabaseConnection {
    pub async fn get_all_categories(&mut self) -> ServiceResult<Vec<MenuCategory>> {
        let rows = sqlx::query("SELECT id, name, position FROM menu_categories ORDER BY position, name")
            .fetch_all(&mut *self.connection)
            .await?;

        rows.iter().map(row_to_category).collect()
    }

    pub async fn get_category_by_id(&mut self, id: u64) -> ServiceResult<Option<MenuCategory>> {
        let row = sqlx::query("SELECT id, name, position FROM menu_categories WHERE id = $1")
            .bind(to_db_id(id))
            .fetch_optional(&mut *self.connection)
            .await?;

        row.as_ref().map(row_to_category).transpose()
    }

    pub async fn category_name_exists(&mut self, name: &str, except_id: u64) -> ServiceResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM menu_categories WHERE lower(name) = lower($1) AND id <> $2)",
        )
        .bind(name)
        .bind(to_db_id(except_id))
        .fetch_one(&mut *self.connection)
        .await?;
        Ok(exists)
    }

    pub async fn store_category(&mut self, category: MenuCategory) -> ServiceResult<MenuCategory> {
        let row = if category.id == 0 {
            sqlx::query(
                "INSERT INTO menu_categories (name, position) VALUES ($1, $2) RETURNING id, name, position",
            )
            .bind(&category.name)
            .bind(category.position)
            .fetch_one(&mut *self.connection)
            .await?
        } else {
            sqlx::query(
                "UPDATE menu_categories SET name = $2, position = $3 WHERE id = $1 RETURNING id, name, position",
            )
            .bind(to_db_id(category.id))
            .bind(&category.name)
            .bind(category.position)
            .fetch_one(&mut *self.connection)
            .await?
        };

        row_to_category(&row)
    }

    pub async fn delete_category(&mut self, id: u64) -> ServiceResult<()> {
        sqlx::query("DELETE FROM menu_categories WHERE id = $1")
            .bind(to_db_id(id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }

    pub async fn get_all_menu_items(&mut self) -> ServiceResult<Vec<MenuItem>> {
        let rows = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM menu_items ORDER BY name"))
            .fetch_all(&mut *self.connection)
            .await?;

        rows.iter().map(row_to_item).collect()
    }

    pub async fn get_menu_item_by_id(&mut self, id: u64) -> ServiceResult<Option<MenuItem>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM menu_items WHERE id = $1"))
            .bind(to_db_id(id))
            .fetch_optional(&mut *self.connection)
            .await?;

        row.as_ref().map(row_to_item).transpose()
    }

    pub async fn get_menu_items_by_ids(&mut self, ids: &[u64]) -> ServiceResult<Vec<MenuItem>> {
        let ids: Vec<i64> = ids.iter().copied().map(to_db_id).collect();
        let rows = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM menu_items WHERE id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.connection)
            .await?;

        rows.iter().map(row_to_item).collect()
    }

    pub async fn store_menu_item(&mut self, item: MenuItem) -> ServiceResult<MenuItem> {
        let row = if item.id == 0 {
            sqlx::query(&format!(
                r#"INSERT INTO menu_items (category_id, name, description, price_cents, image_url, available)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {ITEM_COLUMNS}"#
            ))
            .bind(item.category_id.map(to_db_id))
            .bind(&item.name)
            .bind(&item.description)
            .bind(item.price_cents)
            .bind(&item.image_url)
            .bind(item.available)
            .fetch_one(&mut *self.connection)
            .await?
        } else {
            sqlx::query(&format!(
                r#"UPDATE menu_items SET category_id = $2, name = $3, description = $4,
                    price_cents = $5, image_url = $6, available = $7
                WHERE id = $1
                RETURNING {ITEM_COLUMNS}"#
            ))
            .bind(to_db_id(item.id))
            .bind(item.category_id.map(to_db_id))
            .bind(&item.name)
            .bind(&item.description)
            .bind(item.price_cents)
            .bind(&item.image_url)
            .bind(item.available)
            .fetch_one(&mut *self.connection)
            .await?
        };

        row_to_item(&row)
    }

    pub async fn set_menu_item_availability(
        &mut self,
        id: u64,
        available: bool,
    ) -> ServiceResult<MenuItem> {
        let row = sqlx::query(&format!(
            "UPDATE menu_items SET available = $2 WHERE id = $1 RETURNING {ITEM_COLUMNS}"
        ))
        .bind(to_db_id(id))
        .bind(available)
        .fetch_optional(&mut *self.connection)
        .await?;

        match row {
            Some(row) => row_to_item(&row),
            None => Err(ServiceError::NotFound),
        }
    }

    pub async fn delete_menu_item(&mut self, id: u64) -> ServiceResult<()> {
        sqlx::query("DELETE FROM menu_items WHERE id = $1")
            .bind(to_db_id(id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }
}
