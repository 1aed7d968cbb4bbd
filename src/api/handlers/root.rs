use axum::{http::StatusCode, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct Banner {
    name: String,
    version: String,
}

/// Service banner, undocumented on purpose.
pub async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(Banner {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
