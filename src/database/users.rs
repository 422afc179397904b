use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::ServiceResult;
use crate::models::{AuthSession, User};

use super::{generate_random_string, to_db_id, to_id, DatabaseConnection};

const SESSION_TOKEN_LENGTH: usize = 48;

const USER_COLUMNS: &str =
    "users.id, users.username, users.name, users.role, users.department_id, users.created_at";

fn row_to_user(row: &PgRow) -> ServiceResult<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: to_id(row.try_get("id")?),
        username: row.try_get("username")?,
        name: row.try_get("name")?,
        role: role.parse()?,
        department_id: row.try_get::<Option<i64>, _>("department_id")?.map(to_id),
        created_at: row.try_get("created_at")?,
    })
}

impl DatabaseConnection {
    pub async fn get_all_users(&mut self) -> ServiceResult<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY users.id"))
            .fetch_all(&mut *self.connection)
            .await?;

        rows.iter().map(row_to_user).collect()
    }

    pub async fn count_users(&mut self) -> ServiceResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *self.connection)
            .await?;
        Ok(count)
    }

    pub async fn get_user_by_id(&mut self, id: u64) -> ServiceResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE users.id = $1"))
            .bind(to_db_id(id))
            .fetch_optional(&mut *self.connection)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    /// User together with the stored password hash.
    pub async fn get_user_credentials(
        &mut self,
        username: &str,
    ) -> ServiceResult<Option<(User, Vec<u8>)>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS}, users.password_hash FROM users WHERE users.username = $1"
        ))
        .bind(username)
        .fetch_optional(&mut *self.connection)
        .await?;

        match row {
            Some(row) => Ok(Some((row_to_user(&row)?, row.try_get("password_hash")?))),
            None => Ok(None),
        }
    }

    pub async fn username_exists(&mut self, username: &str, except_id: u64) -> ServiceResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND id <> $2)",
        )
        .bind(username)
        .bind(to_db_id(except_id))
        .fetch_one(&mut *self.connection)
        .await?;
        Ok(exists)
    }

    /// Insert the user if its id is 0, update it otherwise. The password hash is
    /// only written when given.
    pub async fn store_user(
        &mut self,
        user: User,
        password_hash: Option<Vec<u8>>,
    ) -> ServiceResult<User> {
        let row = if user.id == 0 {
            sqlx::query(&format!(
                r#"INSERT INTO users (username, name, role, department_id, password_hash)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {USER_COLUMNS}"#
            ))
            .bind(&user.username)
            .bind(&user.name)
            .bind(user.role.as_str())
            .bind(user.department_id.map(to_db_id))
            .bind(password_hash.unwrap_or_default())
            .fetch_one(&mut *self.connection)
            .await?
        } else {
            sqlx::query(&format!(
                r#"UPDATE users SET username = $2, name = $3, role = $4, department_id = $5,
                    password_hash = COALESCE($6, password_hash)
                WHERE id = $1
                RETURNING {USER_COLUMNS}"#
            ))
            .bind(to_db_id(user.id))
            .bind(&user.username)
            .bind(&user.name)
            .bind(user.role.as_str())
            .bind(user.department_id.map(to_db_id))
            .bind(password_hash)
            .fetch_one(&mut *self.connection)
            .await?
        };

        row_to_user(&row)
    }

    pub async fn delete_user(&mut self, id: u64) -> ServiceResult<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(to_db_id(id))
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }

    pub async fn create_session_token(
        &mut self,
        user_id: u64,
        valid_until: DateTime<Utc>,
    ) -> ServiceResult<String> {
        let token = generate_random_string(SESSION_TOKEN_LENGTH);

        sqlx::query("INSERT INTO auth_sessions (token, user_id, valid_until) VALUES ($1, $2, $3)")
            .bind(&token)
            .bind(to_db_id(user_id))
            .bind(valid_until)
            .execute(&mut *self.connection)
            .await?;

        Ok(token)
    }

    /// Expired tokens are treated as missing.
    pub async fn get_session_by_session_token(
        &mut self,
        token: &str,
    ) -> ServiceResult<Option<AuthSession>> {
        let row = sqlx::query(&format!(
            r#"SELECT {USER_COLUMNS}, auth_sessions.token, auth_sessions.valid_until
            FROM auth_sessions JOIN users ON users.id = auth_sessions.user_id
            WHERE auth_sessions.token = $1 AND auth_sessions.valid_until > now()"#
        ))
        .bind(token)
        .fetch_optional(&mut *self.connection)
        .await?;

        match row {
            Some(row) => Ok(Some(AuthSession {
                user: row_to_user(&row)?,
                token: row.try_get("token")?,
                valid_until: row.try_get("valid_until")?,
            })),
            None => Ok(None),
        }
    }

    pub async fn delete_session_token(&mut self, token: &str) -> ServiceResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE token = $1")
            .bind(token)
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }

    pub async fn delete_expired_session_tokens(&mut self) -> ServiceResult<u64> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE valid_until <= now()")
            .execute(&mut *self.connection)
            .await?;
        Ok(result.rows_affected())
    }
}
