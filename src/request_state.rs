use aide::OperationInput;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization, Cookie};

use crate::{
    broadcast::EventBroadcaster,
    database::{AppState, DatabaseConnection},
    error::{ServiceError, ServiceResult},
    models::{AuthSession, Role, User},
    SESSION_COOKIE_NAME,
};

/// Per request view of the application: a pooled connection and the
/// session of the bearer token, if one was sent and is still valid.
///
/// Browsers cannot set headers on an `EventSource`, so the session cookie
/// set at login is accepted as well.
pub struct RequestState {
    pub db: DatabaseConnection,
    pub session: Option<AuthSession>,
    pub events: EventBroadcaster,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestState
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let mut db = state.connection().await?;

        let token = if let Ok(TypedHeader(Authorization(bearer))) =
            parts.extract::<TypedHeader<Authorization<Bearer>>>().await
        {
            Some(bearer.token().to_owned())
        } else if let Ok(TypedHeader(cookie)) = parts.extract::<TypedHeader<Cookie>>().await {
            cookie.get(SESSION_COOKIE_NAME).map(|t| t.to_owned())
        } else {
            None
        };

        let session = match token {
            Some(token) => db.get_session_by_session_token(&token).await?,
            None => None,
        };

        Ok(Self {
            db,
            session,
            events: state.events.clone(),
        })
    }
}

impl RequestState {
    pub fn session_require(&self) -> ServiceResult<User> {
        match self.session {
            Some(ref session) => Ok(session.user.clone()),
            None => Err(ServiceError::Unauthorized("missing_login")),
        }
    }

    /// Requires a login whose role satisfies one of `roles`.
    pub fn session_require_role(&self, roles: &[Role]) -> ServiceResult<User> {
        let user = self.session_require()?;
        if roles.iter().any(|r| user.role.satisfies(*r)) {
            Ok(user)
        } else {
            Err(ServiceError::Forbidden)
        }
    }

    pub fn session_require_admin(&self) -> ServiceResult<User> {
        self.session_require_role(&[Role::Admin])
    }

    pub fn session_require_manager(&self) -> ServiceResult<User> {
        self.session_require_role(&[Role::Manager])
    }

    pub fn session_require_staff(&self) -> ServiceResult<User> {
        self.session_require_role(&[Role::Staff])
    }

    pub fn session_require_kitchen(&self) -> ServiceResult<User> {
        self.session_require_role(&[Role::Kitchen])
    }

    pub fn session_require_admin_or_self(&self, user_id: u64) -> ServiceResult<User> {
        let user = self.session_require()?;
        if user.role == Role::Admin || user.id == user_id {
            Ok(user)
        } else {
            Err(ServiceError::Forbidden)
        }
    }
}

impl OperationInput for RequestState {}
