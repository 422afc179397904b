use aide::axum::ApiRouter;
use log::warn;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::database::{AppState, DatabaseConnection};
use crate::error::{ServiceError, ServiceResult};

pub mod activity_logs;
pub mod auth;
pub mod dashboard;
pub mod departments;
pub mod events;
pub mod extra_charges;
pub mod guest;
pub mod kitchen;
pub mod menu;
pub mod orders;
pub mod packages;
pub mod promotions;
pub mod sessions;
pub mod tables;
pub mod templates;
pub mod upload;
pub mod users;
pub mod work_orders;

pub fn init(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .merge(auth::router(app_state.clone()))
        .merge(users::router(app_state.clone()))
        .merge(tables::router(app_state.clone()))
        .merge(menu::router(app_state.clone()))
        .merge(packages::router(app_state.clone()))
        .merge(promotions::router(app_state.clone()))
        .merge(extra_charges::router(app_state.clone()))
        .merge(sessions::router(app_state.clone()))
        .merge(orders::router(app_state.clone()))
        .merge(kitchen::router(app_state.clone()))
        .merge(guest::router(app_state.clone()))
        .merge(upload::router(app_state.clone()))
        .merge(events::router(app_state.clone()))
        .merge(activity_logs::router(app_state.clone()))
        .merge(departments::router(app_state.clone()))
        .merge(templates::router(app_state.clone()))
        .merge(work_orders::router(app_state.clone()))
        .merge(dashboard::router(app_state))
}

const SALT_LENGTH: usize = 16;

/// Hashes with argon2i under a fresh random salt, stored as `salt || hash`.
pub fn password_hash_create(password: &str) -> ServiceResult<Vec<u8>> {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect();

    let hash = argon2rs::argon2i_simple(password, &salt);

    let mut stored = salt.into_bytes();
    stored.extend_from_slice(&hash);
    Ok(stored)
}

pub fn password_hash_verify(stored: &[u8], password: &str) -> ServiceResult<bool> {
    if stored.len() <= SALT_LENGTH {
        return Err(ServiceError::InternalServerError(
            "Stored password hash is too short".to_owned(),
        ));
    }

    let (salt, hash) = stored.split_at(SALT_LENGTH);
    let salt = std::str::from_utf8(salt)
        .map_err(|e| ServiceError::InternalServerError(format!("Invalid password salt: {e}")))?;

    let computed = argon2rs::argon2i_simple(password, salt);
    if computed.len() != hash.len() {
        return Ok(false);
    }

    let diff = computed
        .iter()
        .zip(hash.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    Ok(diff == 0)
}

/// Writes an activity log entry. A failing write is only logged.
pub async fn log_activity(
    db: &mut DatabaseConnection,
    user_id: Option<u64>,
    action: &str,
    entity: &str,
    entity_id: Option<u64>,
    detail: &str,
) {
    if let Err(e) = db
        .insert_activity_log(user_id, action, entity, entity_id, detail)
        .await
    {
        warn!("Could not write activity log for {} {}: {}", action, entity, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_roundtrip() {
        let stored = password_hash_create("correct horse").unwrap();
        assert!(password_hash_verify(&stored, "correct horse").unwrap());
        assert!(!password_hash_verify(&stored, "battery staple").unwrap());
    }

    #[test]
    fn password_hash_uses_fresh_salt() {
        let a = password_hash_create("secret").unwrap();
        let b = password_hash_create("secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn truncated_hash_is_rejected() {
        assert!(password_hash_verify(b"short", "secret").is_err());
    }
}
