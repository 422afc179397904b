use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{DiningSession, SessionStatus};

use super::{generate_random_string, to_db_id, to_id, DatabaseConnection};

const GUEST_TOKEN_LENGTH: usize = 32;

const SESSION_QUERY: &str = r#"
    SELECT s.id, s.table_id, t.name AS table_name, s.package_id, s.guest_count, s.token, s.status,
        s.promotion_id, s.opened_at, s.closed_at, s.total_cents
    FROM dining_sessions s JOIN dining_tables t ON t.id = s.table_id
"#;

fn row_to_session(row: &PgRow) -> ServiceResult<DiningSession> {
    let status: String = row.try_get("status")?;
    Ok(DiningSession {
        id: to_id(row.try_get("id")?),
        table_id: to_id(row.try_get("table_id")?),
        table_name: row.try_get("table_name")?,
        package_id: row.try_get::<Option<i64>, _>("package_id")?.map(to_id),
        guest_count: row.try_get("guest_count")?,
        token: row.try_get("token")?,
        status: status.parse()?,
        promotion_id: row.try_get::<Option<i64>, _>("promotion_id")?.map(to_id),
        opened_at: row.try_get("opened_at")?,
        closed_at: row.try_get("closed_at")?,
        total_cents: row.try_get("total_cents")?,
    })
}

impl DatabaseConnection {
    pub async fn get_sessions(
        &mut self,
        status: Option<SessionStatus>,
    ) -> ServiceResult<Vec<DiningSession>> {
        let rows = sqlx::query(&format!(
            "{SESSION_QUERY} WHERE $1::TEXT IS NULL OR s.status = $1 ORDER BY s.opened_at DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&mut *self.connection)
        .await?;

        rows.iter().map(row_to_session).collect()
    }

    pub async fn get_session_by_id(&mut self, id: u64) -> ServiceResult<Option<DiningSession>> {
        let row = sqlx::query(&format!("{SESSION_QUERY} WHERE s.id = $1"))
            .bind(to_db_id(id))
            .fetch_optional(&mut *self.connection)
            .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    /// Only open sessions can be reached through their guest token.
    pub async fn get_open_session_by_token(
        &mut self,
        token: &str,
    ) -> ServiceResult<Option<DiningSession>> {
        let row = sqlx::query(&format!(
            "{SESSION_QUERY} WHERE s.token = $1 AND s.status = 'Open'"
        ))
        .bind(token)
        .fetch_optional(&mut *self.connection)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    pub async fn get_open_session_by_table(
        &mut self,
        table_id: u64,
    ) -> ServiceResult<Option<DiningSession>> {
        let row = sqlx::query(&format!(
            "{SESSION_QUERY} WHERE s.table_id = $1 AND s.status = 'Open'"
        ))
        .bind(to_db_id(table_id))
        .fetch_optional(&mut *self.connection)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    /// Fails with `table_occupied` if the table already has an open session.
    pub async fn open_session(
        &mut self,
        table_id: u64,
        guest_count: i32,
        package_id: Option<u64>,
    ) -> ServiceResult<DiningSession> {
        let result = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO dining_sessions (table_id, package_id, guest_count, token, status)
            VALUES ($1, $2, $3, $4, 'Open') RETURNING id"#,
        )
        .bind(to_db_id(table_id))
        .bind(package_id.map(to_db_id))
        .bind(guest_count)
        .bind(generate_random_string(GUEST_TOKEN_LENGTH))
        .fetch_one(&mut *self.connection)
        .await;

        let id = match result.map_err(ServiceError::from) {
            Err(ServiceError::BadRequest("duplicate_entry")) => {
                return Err(ServiceError::BadRequest("table_occupied"))
            }
            other => other?,
        };

        self.get_session_by_id(to_id(id))
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn set_session_guest_count(&mut self, id: u64, guest_count: i32) -> ServiceResult<()> {
        sqlx::query("UPDATE dining_sessions SET guest_count = $2 WHERE id = $1 AND status = 'Open'")
            .bind(to_db_id(id))
            .bind(guest_count)
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }

    pub async fn set_session_promotion(
        &mut self,
        id: u64,
        promotion_id: Option<u64>,
    ) -> ServiceResult<()> {
        sqlx::query("UPDATE dining_sessions SET promotion_id = $2 WHERE id = $1 AND status = 'Open'")
            .bind(to_db_id(id))
            .bind(promotion_id.map(to_db_id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }

    /// Closes the session if no open order exists, in a single statement.
    ///
    /// Returns `false` if the session was not closed.
    pub async fn close_session(&mut self, id: u64, total_cents: i64) -> ServiceResult<bool> {
        let result = sqlx::query(
            r#"UPDATE dining_sessions SET status = 'Closed', closed_at = $2, total_cents = $3
            WHERE id = $1 AND status = 'Open'
                AND NOT EXISTS (
                    SELECT 1 FROM orders
                    WHERE orders.session_id = $1 AND orders.status IN ('Pending', 'Preparing')
                )"#,
        )
        .bind(to_db_id(id))
        .bind(Utc::now())
        .bind(total_cents)
        .execute(&mut *self.connection)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
