use aide::OperationOutput;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{http::StatusCode, response::IntoResponse, Json};
use log::{debug, error};
use schemars::JsonSchema;
use serde::Serialize;

use crate::i18n::{Translations, TRANSLATIONS};
use crate::env;

/// Represent errors in the application
///
/// All `ServiceError`s can be transformed to http errors. Messages are
/// referenced by their translation key.
#[derive(Debug, Clone, PartialEq, JsonSchema)]
pub enum ServiceError {
    InternalServerError(String),
    NotFound,
    BadRequest(&'static str),
    ValidationFailed(Vec<FieldError>),
    Unauthorized(&'static str),
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, JsonSchema)]
pub struct FieldError {
    pub field: String,
    pub error: &'static str,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for ServiceError {}

/// Helper for `ServiceError` result
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::BadRequest(_) | ServiceError::ValidationFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            ServiceError::InternalServerError(_) => "internal_error",
            ServiceError::NotFound => "not_found",
            ServiceError::BadRequest(key) => key,
            ServiceError::ValidationFailed(_) => "validation_failed",
            ServiceError::Unauthorized(key) => key,
            ServiceError::Forbidden => "forbidden",
        }
    }

    fn body(&self) -> ErrorBody {
        let fields = match self {
            ServiceError::ValidationFailed(fields) => fields
                .iter()
                .map(|f| FieldErrorBody {
                    field: f.field.clone(),
                    error: f.error.to_owned(),
                    message: String::new(),
                })
                .collect(),
            _ => Vec::new(),
        };

        ErrorBody {
            error: self.key().to_owned(),
            message: String::new(),
            fields,
        }
        .localized(&TRANSLATIONS, env::DEFAULT_LOCALE.as_str())
    }
}

/// Json body of every error response.
///
/// The body is also attached to the response extensions, so the
/// localization middleware can translate it to the requested locale.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub fields: Vec<FieldErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct FieldErrorBody {
    pub field: String,
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn localized(mut self, translations: &Translations, locale: &str) -> Self {
        self.message = translations.lookup(locale, &self.error);
        for field in self.fields.iter_mut() {
            field.message = translations.lookup_field(locale, &field.error, &field.field);
        }
        self
    }
}

impl OperationOutput for ServiceError {
    type Inner = String;
}
impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        if let ServiceError::InternalServerError(ref cause) = self {
            error!("Unhandled error: {}", cause);
        }

        let body = self.body();
        let mut response = (self.status_code(), Json(body.clone())).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ServiceError::NotFound,
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => ServiceError::BadRequest("duplicate_entry"),
                Some("23503") => ServiceError::BadRequest("invalid_reference"),
                _ => ServiceError::InternalServerError(err.to_string()),
            },
            _ => ServiceError::InternalServerError(err.to_string()),
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::InternalServerError(err.to_string())
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        let text = rejection.body_text();
        debug!("Rejected json body: {}", text);

        match rejection {
            JsonRejection::JsonDataError(_) => match rejected_field(&text) {
                Some(field) => ServiceError::ValidationFailed(vec![FieldError {
                    field: field.to_owned(),
                    error: "field_invalid",
                }]),
                None => ServiceError::BadRequest("invalid_body"),
            },
            _ => ServiceError::BadRequest("invalid_body"),
        }
    }
}

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(e) => {
                debug!("Rejected path: {}", e.body_text());
                ServiceError::BadRequest("invalid_path")
            }
            other => ServiceError::InternalServerError(other.body_text()),
        }
    }
}

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        debug!("Rejected query: {}", rejection.body_text());
        ServiceError::BadRequest("invalid_query")
    }
}

/// Field path of a json data error, e.g. `items[0].quantity`.
///
/// The rejection text reads `<context>: <path>: <serde error>`, the path is
/// left out when the error is not tied to a field.
fn rejected_field(text: &str) -> Option<&str> {
    let (_, rest) = text.split_once("target type: ")?;
    let (path, _) = rest.split_once(": ")?;
    if path.is_empty() || path == "." || path.contains(char::is_whitespace) {
        return None;
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            ServiceError::BadRequest("session_has_open_orders").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::ValidationFailed(vec![]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Unauthorized("missing_login").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ServiceError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::InternalServerError("boom".to_owned()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_cause_is_not_exposed() {
        let body = ServiceError::InternalServerError("password=hunter2".to_owned()).body();
        assert_eq!(body.error, "internal_error");
        assert!(!body.message.contains("hunter2"));
    }

    #[test]
    fn field_errors_are_rendered() {
        let body = ServiceError::ValidationFailed(vec![FieldError {
            field: "name".to_owned(),
            error: "field_required",
        }])
        .body();

        assert_eq!(body.error, "validation_failed");
        assert_eq!(body.fields.len(), 1);
        assert_eq!(body.fields[0].field, "name");
        assert_eq!(body.fields[0].error, "field_required");
        assert!(body.fields[0].message.contains("name"));
    }

    #[test]
    fn error_response_carries_body_extension() {
        let response = ServiceError::BadRequest("table_occupied").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.extensions().get::<ErrorBody>().cloned();
        assert_eq!(body.map(|b| b.error), Some("table_occupied".to_owned()));
    }

    #[test]
    fn field_path_is_taken_from_data_errors() {
        assert_eq!(
            rejected_field(
                "Failed to deserialize the JSON body into the target type: \
                 items[0].quantity: invalid type: string \"two\", expected i32 at line 1 column 20"
            ),
            Some("items[0].quantity")
        );
        assert_eq!(
            rejected_field(
                "Failed to deserialize the JSON body into the target type: \
                 missing field `name` at line 1 column 2"
            ),
            None
        );
        assert_eq!(
            rejected_field(
                "Failed to deserialize the JSON body into the target type: \
                 invalid type: sequence, expected struct Order at line 1 column 0"
            ),
            None
        );
    }

    #[test]
    fn row_not_found_maps_to_404() {
        assert_eq!(
            ServiceError::from(sqlx::Error::RowNotFound),
            ServiceError::NotFound
        );
    }
}
