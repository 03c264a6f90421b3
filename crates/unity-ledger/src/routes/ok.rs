// Health check route.

use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Handle the health check.
pub fn handle_ok() -> OkResponse {
    OkResponse { ok: true }
}
