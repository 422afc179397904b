use std::collections::HashMap;

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Connection, Row};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    Checkpoint, CheckpointStatus, Comment, DepartmentLoad, WorkOrder, WorkOrderDashboard,
    WorkOrderStatus,
};

use super::{to_db_id, to_id, DatabaseConnection};

#[derive(Debug, Default, Clone, Copy)]
pub struct WorkOrderFilter {
    pub status: Option<WorkOrderStatus>,
    pub department_id: Option<u64>,
}

const WORK_ORDER_COLUMNS: &str = "id, title, description, department_id, template_id, status, \
    created_by, due_at, created_at, updated_at";

fn row_to_checkpoint(row: &PgRow) -> ServiceResult<Checkpoint> {
    let status: String = row.try_get("status")?;
    Ok(Checkpoint {
        id: to_id(row.try_get("id")?),
        work_order_id: to_id(row.try_get("work_order_id")?),
        position: row.try_get("position")?,
        name: row.try_get("name")?,
        department_id: row.try_get::<Option<i64>, _>("department_id")?.map(to_id),
        status: status.parse()?,
        completed_by: row.try_get::<Option<i64>, _>("completed_by")?.map(to_id),
        completed_at: row.try_get("completed_at")?,
    })
}

fn row_to_comment(row: &PgRow) -> ServiceResult<Comment> {
    Ok(Comment {
        id: to_id(row.try_get("id")?),
        work_order_id: to_id(row.try_get("work_order_id")?),
        author_id: row.try_get::<Option<i64>, _>("author_id")?.map(to_id),
        author_name: row.try_get("author_name")?,
        body: row.try_get("body")?,
        created_at: row.try_get("created_at")?,
    })
}

impl DatabaseConnection {
    async fn load_work_orders(&mut self, rows: Vec<PgRow>) -> ServiceResult<Vec<WorkOrder>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<Result<Vec<i64>, _>>()?;

        let checkpoint_rows = sqlx::query(
            r#"SELECT id, work_order_id, position, name, department_id, status, completed_by, completed_at
            FROM checkpoints WHERE work_order_id = ANY($1)
            ORDER BY work_order_id, position"#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.connection)
        .await?;

        let mut checkpoints = HashMap::<u64, Vec<Checkpoint>>::new();
        for row in checkpoint_rows.iter() {
            let checkpoint = row_to_checkpoint(row)?;
            checkpoints
                .entry(checkpoint.work_order_id)
                .or_default()
                .push(checkpoint);
        }

        let mut work_orders = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let id = to_id(row.try_get("id")?);
            let status: String = row.try_get("status")?;
            work_orders.push(WorkOrder {
                id,
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                department_id: row.try_get::<Option<i64>, _>("department_id")?.map(to_id),
                template_id: row.try_get::<Option<i64>, _>("template_id")?.map(to_id),
                status: status.parse()?,
                created_by: row.try_get::<Option<i64>, _>("created_by")?.map(to_id),
                due_at: row.try_get("due_at")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
                checkpoints: checkpoints.remove(&id).unwrap_or_default(),
            });
        }

        Ok(work_orders)
    }

    pub async fn get_work_orders(&mut self, filter: WorkOrderFilter) -> ServiceResult<Vec<WorkOrder>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {WORK_ORDER_COLUMNS} FROM work_orders
            WHERE ($1::TEXT IS NULL OR status = $1)
                AND ($2::BIGINT IS NULL OR department_id = $2)
            ORDER BY created_at DESC, id DESC"#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.department_id.map(to_db_id))
        .fetch_all(&mut *self.connection)
        .await?;

        self.load_work_orders(rows).await
    }

    pub async fn get_work_order_by_id(&mut self, id: u64) -> ServiceResult<Option<WorkOrder>> {
        let rows = sqlx::query(&format!(
            "SELECT {WORK_ORDER_COLUMNS} FROM work_orders WHERE id = $1"
        ))
        .bind(to_db_id(id))
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(self.load_work_orders(rows).await?.pop())
    }

    /// Inserts the work order together with its checkpoints.
    ///
    /// Checkpoint positions are taken from their order in `work_order.checkpoints`.
    pub async fn create_work_order(&mut self, work_order: WorkOrder) -> ServiceResult<WorkOrder> {
        let mut tx = self.connection.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO work_orders (title, description, department_id, template_id, status, created_by, due_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id"#,
        )
        .bind(&work_order.title)
        .bind(&work_order.description)
        .bind(work_order.department_id.map(to_db_id))
        .bind(work_order.template_id.map(to_db_id))
        .bind(WorkOrderStatus::Open.as_str())
        .bind(work_order.created_by.map(to_db_id))
        .bind(work_order.due_at)
        .fetch_one(&mut *tx)
        .await?;

        for (position, checkpoint) in work_order.checkpoints.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO checkpoints (work_order_id, position, name, department_id, status)
                VALUES ($1, $2, $3, $4, $5)"#,
            )
            .bind(id)
            .bind(position as i32)
            .bind(&checkpoint.name)
            .bind(checkpoint.department_id.map(to_db_id))
            .bind(CheckpointStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_work_order_by_id(to_id(id))
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Updates the descriptive fields. Status and checkpoints are left untouched.
    pub async fn update_work_order(&mut self, work_order: WorkOrder) -> ServiceResult<WorkOrder> {
        sqlx::query(
            r#"UPDATE work_orders SET title = $2, description = $3, department_id = $4, due_at = $5, updated_at = $6
            WHERE id = $1"#,
        )
        .bind(to_db_id(work_order.id))
        .bind(&work_order.title)
        .bind(&work_order.description)
        .bind(work_order.department_id.map(to_db_id))
        .bind(work_order.due_at)
        .bind(Utc::now())
        .execute(&mut *self.connection)
        .await?;

        self.get_work_order_by_id(work_order.id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn delete_work_order(&mut self, id: u64) -> ServiceResult<()> {
        sqlx::query("DELETE FROM work_orders WHERE id = $1")
            .bind(to_db_id(id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }

    /// Returns `false` if the work order was already completed or cancelled.
    pub async fn cancel_work_order(&mut self, id: u64) -> ServiceResult<bool> {
        let result = sqlx::query(
            r#"UPDATE work_orders SET status = 'Cancelled', updated_at = $2
            WHERE id = $1 AND status IN ('Open', 'InProgress')"#,
        )
        .bind(to_db_id(id))
        .bind(Utc::now())
        .execute(&mut *self.connection)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Marks the checkpoint done and re-derives the work order status.
    ///
    /// The checkpoint is only updated while it is still pending and the work
    /// order is not finished.
    pub async fn complete_checkpoint(
        &mut self,
        work_order_id: u64,
        checkpoint_id: u64,
        user_id: u64,
    ) -> ServiceResult<WorkOrder> {
        let mut tx = self.connection.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"UPDATE checkpoints SET status = 'Done', completed_by = $3, completed_at = $4
            WHERE id = $2 AND work_order_id = $1 AND status = 'Pending'
                AND EXISTS (
                    SELECT 1 FROM work_orders
                    WHERE work_orders.id = $1 AND work_orders.status IN ('Open', 'InProgress')
                )"#,
        )
        .bind(to_db_id(work_order_id))
        .bind(to_db_id(checkpoint_id))
        .bind(to_db_id(user_id))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(ServiceError::BadRequest("checkpoint_already_done"));
        }

        let statuses: Vec<String> =
            sqlx::query_scalar("SELECT status FROM checkpoints WHERE work_order_id = $1")
                .bind(to_db_id(work_order_id))
                .fetch_all(&mut *tx)
                .await?;
        let statuses = statuses
            .iter()
            .map(|s| s.parse::<CheckpointStatus>())
            .collect::<Result<Vec<_>, _>>()?;

        sqlx::query("UPDATE work_orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(to_db_id(work_order_id))
            .bind(WorkOrderStatus::derive(&statuses).as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get_work_order_by_id(work_order_id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn get_comments(&mut self, work_order_id: u64) -> ServiceResult<Vec<Comment>> {
        let rows = sqlx::query(
            r#"SELECT c.id, c.work_order_id, c.author_id, u.name AS author_name, c.body, c.created_at
            FROM comments c LEFT JOIN users u ON u.id = c.author_id
            WHERE c.work_order_id = $1
            ORDER BY c.created_at, c.id"#,
        )
        .bind(to_db_id(work_order_id))
        .fetch_all(&mut *self.connection)
        .await?;

        rows.iter().map(row_to_comment).collect()
    }

    pub async fn get_comment_by_id(&mut self, id: u64) -> ServiceResult<Option<Comment>> {
        let row = sqlx::query(
            r#"SELECT c.id, c.work_order_id, c.author_id, u.name AS author_name, c.body, c.created_at
            FROM comments c LEFT JOIN users u ON u.id = c.author_id
            WHERE c.id = $1"#,
        )
        .bind(to_db_id(id))
        .fetch_optional(&mut *self.connection)
        .await?;

        row.as_ref().map(row_to_comment).transpose()
    }

    pub async fn create_comment(
        &mut self,
        work_order_id: u64,
        author_id: u64,
        body: &str,
    ) -> ServiceResult<Comment> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO comments (work_order_id, author_id, body) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(to_db_id(work_order_id))
        .bind(to_db_id(author_id))
        .bind(body)
        .fetch_one(&mut *self.connection)
        .await?;

        self.get_comment_by_id(to_id(id))
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn delete_comment(&mut self, id: u64) -> ServiceResult<()> {
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(to_db_id(id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }

    pub async fn get_work_order_dashboard(&mut self) -> ServiceResult<WorkOrderDashboard> {
        let mut dashboard = WorkOrderDashboard::default();

        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM work_orders GROUP BY status")
            .fetch_all(&mut *self.connection)
            .await?;
        for row in rows.iter() {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            match status.parse::<WorkOrderStatus>()? {
                WorkOrderStatus::Open => dashboard.open = count,
                WorkOrderStatus::InProgress => dashboard.in_progress = count,
                WorkOrderStatus::Completed => dashboard.completed = count,
                WorkOrderStatus::Cancelled => dashboard.cancelled = count,
            }
        }

        dashboard.overdue = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM work_orders
            WHERE status IN ('Open', 'InProgress') AND due_at IS NOT NULL AND due_at < $1"#,
        )
        .bind(Utc::now())
        .fetch_one(&mut *self.connection)
        .await?;

        let rows = sqlx::query(
            r#"SELECT w.department_id, d.name AS department_name, COUNT(*) AS open
            FROM work_orders w LEFT JOIN departments d ON d.id = w.department_id
            WHERE w.status IN ('Open', 'InProgress')
            GROUP BY w.department_id, d.name
            ORDER BY d.name NULLS LAST"#,
        )
        .fetch_all(&mut *self.connection)
        .await?;
        for row in rows.iter() {
            dashboard.by_department.push(DepartmentLoad {
                department_id: row.try_get::<Option<i64>, _>("department_id")?.map(to_id),
                department_name: row.try_get("department_name")?,
                open: row.try_get("open")?,
            });
        }

        Ok(dashboard)
    }
}
