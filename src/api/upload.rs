use std::path::Path;

use aide::axum::routing::post_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart};
use axum::http::StatusCode;
use axum::Json;
use log::{error, info};
use schemars::JsonSchema;
use serde::Serialize;

use crate::database::{generate_random_string, AppState};
use crate::env;
use crate::error::{ServiceError, ServiceResult};
use crate::request_state::RequestState;

use super::log_activity;

const UPLOAD_NAME_LENGTH: usize = 24;

/// Accepted content types and the file extension they are stored with.
const SUPPORTED_IMAGE_TYPES: [(&str, &str); 7] = [
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
    ("image/svg", "svg"),
    ("image/svg+xml", "svg"),
];

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route("/upload", post_with(upload_image, upload_image_docs))
        // room for the multipart framing around the file
        .layer(DefaultBodyLimit::max(*env::UPLOAD_MAX_BYTES + 64 * 1024))
        .with_state(app_state)
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    let content_type = content_type.trim().to_lowercase();
    SUPPORTED_IMAGE_TYPES
        .iter()
        .find(|(t, _)| *t == content_type)
        .map(|(_, ext)| *ext)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct UploadDto {
    /// Path under which the file is served, usable as menu item image url
    pub url: String,
}

/// Reads fields until the first supported image within `max_bytes`.
async fn read_image(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> ServiceResult<(&'static str, Bytes)> {
    let mut skipped_large = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_rejection)? {
        let Some(extension) = field.content_type().and_then(extension_for) else {
            continue;
        };

        let data = field.bytes().await.map_err(multipart_rejection)?;
        if data.len() > max_bytes {
            skipped_large = true;
            continue;
        }

        return Ok((extension, data));
    }

    if skipped_large {
        Err(ServiceError::BadRequest("upload_too_large"))
    } else {
        Err(ServiceError::BadRequest("unsupported_upload"))
    }
}

fn multipart_rejection(err: MultipartError) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::BadRequest("upload_too_large")
    } else {
        ServiceError::BadRequest("invalid_upload")
    }
}

async fn upload_image(mut state: RequestState, mut multipart: Multipart) -> ServiceResult<Json<UploadDto>> {
    let user = state.session_require_manager()?;

    let (extension, data) = read_image(&mut multipart, *env::UPLOAD_MAX_BYTES).await?;

    let name = format!("{}.{}", generate_random_string(UPLOAD_NAME_LENGTH), extension);
    let dir = Path::new(env::UPLOAD_DIR.as_str());

    let stored = match tokio::fs::create_dir_all(dir).await {
        Ok(()) => tokio::fs::write(dir.join(&name), &data).await,
        Err(e) => Err(e),
    };
    if let Err(e) = stored {
        error!("Could not store upload {}: {}", name, e);
        return Err(ServiceError::InternalServerError(format!(
            "Could not store upload: {}",
            e
        )));
    }

    info!("Stored upload {} ({} bytes)", name, data.len());
    log_activity(&mut state.db, Some(user.id), "upload", "image", None, &name).await;
    Ok(Json(UploadDto {
        url: format!("/uploads/{}", name),
    }))
}

fn upload_image_docs(op: TransformOperation) -> TransformOperation {
    op.description("Upload an image (png, jpeg, webp, gif or svg). The first image field within the size limit is stored.")
        .tag("upload")
        .response::<200, Json<UploadDto>>()
        .response_with::<400, (), _>(|res| res.description("No image field, file too large or malformed multipart body!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http;
    use axum::extract::{FromRequest, Request};

    const BOUNDARY: &str = "tablemate-boundary";

    fn multipart(parts: &[(&str, &str, &str)]) -> Request {
        let mut body = String::new();
        for (name, content_type, data) in parts {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n{data}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        http::Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn read(request: Request, max_bytes: usize) -> ServiceResult<(&'static str, Bytes)> {
        let mut multipart = Multipart::from_request(request, &()).await.unwrap();
        read_image(&mut multipart, max_bytes).await
    }

    #[tokio::test]
    async fn oversized_images_are_skipped() {
        let request = multipart(&[
            ("notes", "text/plain", "hello"),
            ("large", "image/png", "0123456789"),
            ("small", "image/gif", "GIF"),
        ]);
        let (extension, data) = read(request, 4).await.unwrap();
        assert_eq!(extension, "gif");
        assert_eq!(&data[..], b"GIF");
    }

    #[tokio::test]
    async fn only_oversized_images_are_too_large() {
        let request = multipart(&[("large", "image/png", "0123456789")]);
        assert_eq!(
            read(request, 4).await,
            Err(ServiceError::BadRequest("upload_too_large"))
        );

        let request = multipart(&[("notes", "text/plain", "hello")]);
        assert_eq!(
            read(request, 4).await,
            Err(ServiceError::BadRequest("unsupported_upload"))
        );
    }

    #[tokio::test]
    async fn malformed_bodies_are_rejected() {
        let request = http::Request::builder()
            .method("POST")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from("--not-the-boundary\r\ngarbage"))
            .unwrap();
        assert_eq!(
            read(request, 4).await,
            Err(ServiceError::BadRequest("invalid_upload"))
        );
    }

    #[test]
    fn image_types_map_to_extensions() {
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("IMAGE/JPEG"), Some("jpg"));
        assert_eq!(extension_for("image/svg+xml"), Some("svg"));
        assert_eq!(extension_for("application/pdf"), None);
        assert_eq!(extension_for("text/html"), None);
    }
}
