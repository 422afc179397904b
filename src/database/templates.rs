use std::collections::HashMap;

use sqlx::{Connection, Row};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{TemplateStep, WorkOrderTemplate};

use super::{to_db_id, to_id, DatabaseConnection};

impl DatabaseConnection {
    async fn load_templates(&mut self, id: Option<u64>) -> ServiceResult<Vec<WorkOrderTemplate>> {
        let rows = sqlx::query(
            r#"SELECT id, name, description FROM work_order_templates
            WHERE $1::BIGINT IS NULL OR id = $1
            ORDER BY name"#,
        )
        .bind(id.map(to_db_id))
        .fetch_all(&mut *self.connection)
        .await?;

        let step_rows = sqlx::query(
            r#"SELECT template_id, name, department_id FROM template_steps
            WHERE $1::BIGINT IS NULL OR template_id = $1
            ORDER BY template_id, position"#,
        )
        .bind(id.map(to_db_id))
        .fetch_all(&mut *self.connection)
        .await?;

        let mut steps = HashMap::<u64, Vec<TemplateStep>>::new();
        for row in step_rows.iter() {
            steps
                .entry(to_id(row.try_get("template_id")?))
                .or_default()
                .push(TemplateStep {
                    name: row.try_get("name")?,
                    department_id: row.try_get::<Option<i64>, _>("department_id")?.map(to_id),
                });
        }

        let mut templates = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let id = to_id(row.try_get("id")?);
            templates.push(WorkOrderTemplate {
                id,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                steps: steps.remove(&id).unwrap_or_default(),
            });
        }

        Ok(templates)
    }

    pub async fn get_all_templates(&mut self) -> ServiceResult<Vec<WorkOrderTemplate>> {
        self.load_templates(None).await
    }

    pub async fn get_template_by_id(&mut self, id: u64) -> ServiceResult<Option<WorkOrderTemplate>> {
        Ok(self.load_templates(Some(id)).await?.pop())
    }

    /// Stores the template and replaces its steps.
    pub async fn store_template(
        &mut self,
        template: WorkOrderTemplate,
    ) -> ServiceResult<WorkOrderTemplate> {
        let mut tx = self.connection.begin().await?;

        let id: i64 = if template.id == 0 {
            sqlx::query_scalar(
                "INSERT INTO work_order_templates (name, description) VALUES ($1, $2) RETURNING id",
            )
            .bind(&template.name)
            .bind(&template.description)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query_scalar(
                "UPDATE work_order_templates SET name = $2, description = $3 WHERE id = $1 RETURNING id",
            )
            .bind(to_db_id(template.id))
            .bind(&template.name)
            .bind(&template.description)
            .fetch_one(&mut *tx)
            .await?
        };

        sqlx::query("DELETE FROM template_steps WHERE template_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for (position, step) in template.steps.iter().enumerate() {
            sqlx::query(
                "INSERT INTO template_steps (template_id, position, name, department_id) VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(position as i32)
            .bind(&step.name)
            .bind(step.department_id.map(to_db_id))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_template_by_id(to_id(id))
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn delete_template(&mut self, id: u64) -> ServiceResult<()> {
        sqlx::query("DELETE FROM work_order_templates WHERE id = $1")
            .bind(to_db_id(id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }
}
