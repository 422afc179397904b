use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::ServiceResult;
use crate::models::Department;

use super::{to_db_id, to_id, DatabaseConnection};

fn row_to_department(row: &PgRow) -> ServiceResult<Department> {
    Ok(Department {
        id: to_id(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

impl DatabaseConnection {
    pub async fn get_all_departments(&mut self) -> ServiceResult<Vec<Department>> {
        let rows = sqlx::query("SELECT id, name, description FROM departments ORDER BY name")
            .fetch_all(&mut *self.connection)
            .await?;

        rows.iter().map(row_to_department).collect()
    }

    pub async fn get_department_by_id(&mut self, id: u64) -> ServiceResult<Option<Department>> {
        let row = sqlx::query("SELECT id, name, description FROM departments WHERE id = $1")
            .bind(to_db_id(id))
            .fetch_optional(&mut *self.connection)
            .await?;

        row.as_ref().map(row_to_department).transpose()
    }

    pub async fn department_name_exists(&mut self, name: &str, except_id: u64) -> ServiceResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM departments WHERE lower(name) = lower($1) AND id <> $2)",
        )
        .bind(name)
        .bind(to_db_id(except_id))
        .fetch_one(&mut *self.connection)
        .await?;
        Ok(exists)
    }

    pub async fn store_department(&mut self, department: Department) -> ServiceResult<Department> {
        let row = if department.id == 0 {
            sqlx::query(
                "INSERT INTO departments (name, description) VALUES ($1, $2) RETURNING id, name, description",
            )
            .bind(&department.name)
            .bind(&department.description)
            .fetch_one(&mut *self.connection)
            .await?
        } else {
            sqlx::query(
                "UPDATE departments SET name = $2, description = $3 WHERE id = $1 RETURNING id, name, description",
            )
            .bind(to_db_id(department.id))
            .bind(&department.name)
            .bind(&department.description)
            .fetch_one(&mut *self.connection)
            .await?
        };

        row_to_department(&row)
    }

    pub async fn delete_department(&mut self, id: u64) -> ServiceResult<()> {
        sqlx::query("DELETE FROM departments WHERE id = $1")
            .bind(to_db_id(id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }
}
