use std::sync::Arc;

use aide::{
    axum::{
        routing::{get, get_with},
        ApiRouter, IntoApiResponse,
    },
    openapi::{OpenApi, Tag},
    redoc::Redoc,
    transform::TransformOpenApi,
};
use axum::{response::IntoResponse, Extension, Json};

const TAGS: [(&str, &str); 16] = [
    ("auth", "Login and logout"),
    ("users", "User management"),
    ("tables", "Dining tables"),
    ("menu", "Menu categories and items"),
    ("packages", "Buffet packages"),
    ("promotions", "Promotion codes and discounts"),
    ("extra_charges", "Service charges and taxes added to every bill"),
    ("sessions", "Dining sessions and bills"),
    ("orders", "Orders and kitchen status"),
    ("kitchen", "Kitchen queue"),
    ("guest", "Ordering from guest devices via qr code"),
    ("upload", "Image uploads"),
    ("events", "Realtime event streams"),
    ("activity_logs", "Audit trail"),
    ("flowtrak", "FlowTrak work orders, departments and templates"),
    ("docs", "This documentation"),
];

pub fn api_docs(api: TransformOpenApi) -> TransformOpenApi {
    let mut api = api
        .title("tablemate")
        .summary("Restaurant point of sale and FlowTrak workflow tracking")
        .description(include_str!("../README.md"));

    for (name, description) in TAGS {
        api = api.tag(Tag {
            name: name.into(),
            description: Some(description.into()),
            ..Default::default()
        });
    }

    api.security_scheme(
        "SessionToken",
        aide::openapi::SecurityScheme::Http {
            scheme: "bearer".into(),
            bearer_format: Some("token".into()),
            description: Some("Token returned by `POST /api/v1/auth/login`.".into()),
            extensions: Default::default(),
        },
    )
}

pub fn docs_routes() -> ApiRouter {
    // response inference only for the redoc page, it is wrong for json routes
    aide::gen::infer_responses(true);

    let router = ApiRouter::new()
        .api_route(
            "/",
            get_with(
                Redoc::new("/docs/api.json")
                    .with_title("tablemate")
                    .axum_handler(),
                |op| op.description("This documentation page.").tag("docs"),
            ),
        )
        .route("/api.json", get(serve_docs));

    aide::gen::infer_responses(false);

    router
}

async fn serve_docs(Extension(api): Extension<Arc<OpenApi>>) -> impl IntoApiResponse {
    Json(api).into_response()
}
