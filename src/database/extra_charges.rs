use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::ServiceResult;
use crate::models::ExtraCharge;

use super::{to_db_id, to_id, DatabaseConnection};

fn row_to_charge(row: &PgRow) -> ServiceResult<ExtraCharge> {
    let kind: String = row.try_get("kind")?;
    Ok(ExtraCharge {
        id: to_id(row.try_get("id")?),
        name: row.try_get("name")?,
        kind: kind.parse()?,
        amount: row.try_get("amount")?,
        active: row.try_get("active")?,
    })
}

impl DatabaseConnection {
    pub async fn get_all_extra_charges(&mut self) -> ServiceResult<Vec<ExtraCharge>> {
        let rows = sqlx::query("SELECT id, name, kind, amount, active FROM extra_charges ORDER BY id")
            .fetch_all(&mut *self.connection)
            .await?;

        rows.iter().map(row_to_charge).collect()
    }

    pub async fn get_active_extra_charges(&mut self) -> ServiceResult<Vec<ExtraCharge>> {
        let rows = sqlx::query(
            "SELECT id, name, kind, amount, active FROM extra_charges WHERE active ORDER BY id",
        )
        .fetch_all(&mut *self.connection)
        .await?;

        rows.iter().map(row_to_charge).collect()
    }

    pub async fn get_extra_charge_by_id(&mut self, id: u64) -> ServiceResult<Option<ExtraCharge>> {
        let row = sqlx::query("SELECT id, name, kind, amount, active FROM extra_charges WHERE id = $1")
            .bind(to_db_id(id))
            .fetch_optional(&mut *self.connection)
            .await?;

        row.as_ref().map(row_to_charge).transpose()
    }

    pub async fn store_extra_charge(&mut self, charge: ExtraCharge) -> ServiceResult<ExtraCharge> {
        let row = if charge.id == 0 {
            sqlx::query(
                r#"INSERT INTO extra_charges (name, kind, amount, active) VALUES ($1, $2, $3, $4)
                RETURNING id, name, kind, amount, active"#,
            )
            .bind(&charge.name)
            .bind(charge.kind.as_str())
            .bind(charge.amount)
            .bind(charge.active)
            .fetch_one(&mut *self.connection)
            .await?
        } else {
            sqlx::query(
                r#"UPDATE extra_charges SET name = $2, kind = $3, amount = $4, active = $5 WHERE id = $1
                RETURNING id, name, kind, amount, active"#,
            )
            .bind(to_db_id(charge.id))
            .bind(&charge.name)
            .bind(charge.kind.as_str())
            .bind(charge.amount)
            .bind(charge.active)
            .fetch_one(&mut *self.connection)
            .await?
        };

        row_to_charge(&row)
    }

    pub async fn delete_extra_charge(&mut self, id: u64) -> ServiceResult<()> {
        sqlx::query("DELETE FROM extra_charges WHERE id = $1")
            .bind(to_db_id(id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }
}
