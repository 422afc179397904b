use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::ServiceResult;
use crate::models::{Discount, Promotion};

use super::{to_db_id, to_id, DatabaseConnection};

const PROMOTION_COLUMNS: &str =
    "id, name, code, discount_kind, discount_value, starts_at, ends_at, active";

fn row_to_promotion(row: &PgRow) -> ServiceResult<Promotion> {
    let kind: String = row.try_get("discount_kind")?;
    Ok(Promotion {
        id: to_id(row.try_get("id")?),
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        discount: Discount::from_parts(&kind, row.try_get("discount_value")?)?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        active: row.try_get("active")?,
    })
}

impl DatabaseConnection {
    pub async fn get_all_promotions(&mut self) -> ServiceResult<Vec<Promotion>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROMOTION_COLUMNS} FROM promotions ORDER BY name"
        ))
        .fetch_all(&mut *self.connection)
        .await?;

        rows.iter().map(row_to_promotion).collect()
    }

    pub async fn get_promotion_by_id(&mut self, id: u64) -> ServiceResult<Option<Promotion>> {
        let row = sqlx::query(&format!(
            "SELECT {PROMOTION_COLUMNS} FROM promotions WHERE id = $1"
        ))
        .bind(to_db_id(id))
        .fetch_optional(&mut *self.connection)
        .await?;

        row.as_ref().map(row_to_promotion).transpose()
    }

    /// Codes are matched case insensitive.
    pub async fn get_promotion_by_code(&mut self, code: &str) -> ServiceResult<Option<Promotion>> {
        let row = sqlx::query(&format!(
            "SELECT {PROMOTION_COLUMNS} FROM promotions WHERE upper(code) = upper($1)"
        ))
        .bind(code.trim())
        .fetch_optional(&mut *self.connection)
        .await?;

        row.as_ref().map(row_to_promotion).transpose()
    }

    pub async fn store_promotion(&mut self, promotion: Promotion) -> ServiceResult<Promotion> {
        let row = if promotion.id == 0 {
            sqlx::query(&format!(
                r#"INSERT INTO promotions (name, code, discount_kind, discount_value, starts_at, ends_at, active)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING {PROMOTION_COLUMNS}"#
            ))
            .bind(&promotion.name)
            .bind(&promotion.code)
            .bind(promotion.discount.kind())
            .bind(promotion.discount.value())
            .bind(promotion.starts_at)
            .bind(promotion.ends_at)
            .bind(promotion.active)
            .fetch_one(&mut *self.connection)
            .await?
        } else {
            sqlx::query(&format!(
                r#"UPDATE promotions SET name = $2, code = $3, discount_kind = $4, discount_value = $5,
                    starts_at = $6, ends_at = $7, active = $8
                WHERE id = $1
                RETURNING {PROMOTION_COLUMNS}"#
            ))
            .bind(to_db_id(promotion.id))
            .bind(&promotion.name)
            .bind(&promotion.code)
            .bind(promotion.discount.kind())
            .bind(promotion.discount.value())
            .bind(promotion.starts_at)
            .bind(promotion.ends_at)
            .bind(promotion.active)
            .fetch_one(&mut *self.connection)
            .await?
        };

        row_to_promotion(&row)
    }

    pub async fn delete_promotion(&mut self, id: u64) -> ServiceResult<()> {
        sqlx::query("DELETE FROM promotions WHERE id = $1")
            .bind(to_db_id(id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }
}
