use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::{ServiceError, ServiceResult};
use crate::models::DiningTable;

use super::{to_db_id, to_id, DatabaseConnection};

const TABLE_QUERY: &str = r#"
    SELECT t.id, t.name, t.seats, t.zone, t.active,
        EXISTS(SELECT 1 FROM dining_sessions s WHERE s.table_id = t.id AND s.status = 'Open') AS occupied
    FROM dining_tables t
"#;

fn row_to_table(row: &PgRow) -> ServiceResult<DiningTable> {
    Ok(DiningTable {
        id: to_id(row.try_get("id")?),
        name: row.try_get("name")?,
        seats: row.try_get("seats")?,
        zone: row.try_get("zone")?,
        active: row.try_get("active")?,
        occupied: row.try_get("occupied")?,
    })
}

impl DatabaseConnection {
    pub async fn get_all_tables(&mut self) -> ServiceResult<Vec<DiningTable>> {
        let rows = sqlx::query(&format!("{TABLE_QUERY} ORDER BY t.zone, t.name"))
            .fetch_all(&mut *self.connection)
            .await?;

        rows.iter().map(row_to_table).collect()
    }

    pub async fn get_table_by_id(&mut self, id: u64) -> ServiceResult<Option<DiningTable>> {
        let row = sqlx::query(&format!("{TABLE_QUERY} WHERE t.id = $1"))
            .bind(to_db_id(id))
            .fetch_optional(&mut *self.connection)
            .await?;

        row.as_ref().map(row_to_table).transpose()
    }

    pub async fn table_name_exists(&mut self, name: &str, except_id: u64) -> ServiceResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM dining_tables WHERE lower(name) = lower($1) AND id <> $2)",
        )
        .bind(name)
        .bind(to_db_id(except_id))
        .fetch_one(&mut *self.connection)
        .await?;
        Ok(exists)
    }

    pub async fn store_table(&mut self, table: DiningTable) -> ServiceResult<DiningTable> {
        let id: i64 = if table.id == 0 {
            sqlx::query_scalar(
                "INSERT INTO dining_tables (name, seats, zone, active) VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(&table.name)
            .bind(table.seats)
            .bind(&table.zone)
            .bind(table.active)
            .fetch_one(&mut *self.connection)
            .await?
        } else {
            sqlx::query_scalar(
                "UPDATE dining_tables SET name = $2, seats = $3, zone = $4, active = $5 WHERE id = $1 RETURNING id",
            )
            .bind(to_db_id(table.id))
            .bind(&table.name)
            .bind(table.seats)
            .bind(&table.zone)
            .bind(table.active)
            .fetch_one(&mut *self.connection)
            .await?
        };

        self.get_table_by_id(to_id(id))
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn delete_table(&mut self, id: u64) -> ServiceResult<()> {
        sqlx::query("DELETE FROM dining_tables WHERE id = $1")
            .bind(to_db_id(id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }
}
