use sqlx::Row;

use crate::error::ServiceResult;
use crate::models::ActivityLog;

use super::{to_db_id, to_id, DatabaseConnection};

impl DatabaseConnection {
    pub async fn insert_activity_log(
        &mut self,
        user_id: Option<u64>,
        action: &str,
        entity: &str,
        entity_id: Option<u64>,
        detail: &str,
    ) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO activity_logs (user_id, action, entity, entity_id, detail) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id.map(to_db_id))
        .bind(action)
        .bind(entity)
        .bind(entity_id.map(to_db_id))
        .bind(detail)
        .execute(&mut *self.connection)
        .await?;
        Ok(())
    }

    /// Most recent entries first.
    pub async fn get_activity_logs(&mut self, limit: i64) -> ServiceResult<Vec<ActivityLog>> {
        let rows = sqlx::query(
            r#"SELECT id, user_id, action, entity, entity_id, detail, created_at
            FROM activity_logs ORDER BY created_at DESC, id DESC LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(&mut *self.connection)
        .await?;

        rows.iter()
            .map(|row| -> ServiceResult<ActivityLog> {
                Ok(ActivityLog {
                    id: to_id(row.try_get("id")?),
                    user_id: row.try_get::<Option<i64>, _>("user_id")?.map(to_id),
                    action: row.try_get("action")?,
                    entity: row.try_get("entity")?,
                    entity_id: row.try_get::<Option<i64>, _>("entity_id")?.map(to_id),
                    detail: row.try_get("detail")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
