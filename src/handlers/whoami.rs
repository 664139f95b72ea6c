use axum::{Extension, Json};
use serde::Serialize;

use crate::middleware::ClientIdentity;

#[derive(Serialize)]
pub struct WhoamiResponse {
    pub identity: String,
}

// Reports the identity the rate limiter charged this request to
pub async fn whoami_handler(
    Extension(ClientIdentity(identity)): Extension<ClientIdentity>,
) -> Json<WhoamiResponse> {
    Json(WhoamiResponse { identity })
}
