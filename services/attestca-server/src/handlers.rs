use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use attestca_provisioning::{ErrorKind, ProvisioningAuthority, ProvisioningError};
use std::sync::Arc;
use tracing::error;

use crate::state::AppState;

const OCTET_STREAM: &str = "application/octet-stream";

pub async fn identity_claim(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    run(state, body, |authority, request| {
        authority.process_identity_claim(request)
    })
    .await
}

pub async fn certificate_request(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    run(state, body, |authority, request| {
        authority.process_certificate_request(request)
    })
    .await
}

/// RSA and SQLite work happens off the async executor.
async fn run<F>(state: Arc<AppState>, body: Bytes, phase: F) -> Response
where
    F: FnOnce(&ProvisioningAuthority, &[u8]) -> Result<Vec<u8>, ProvisioningError>
        + Send
        + 'static,
{
    let authority = state.authority.clone();
    match tokio::task::spawn_blocking(move || phase(authority.as_ref(), &body[..])).await {
        Ok(Ok(response)) => ([(header::CONTENT_TYPE, OCTET_STREAM)], response).into_response(),
        Ok(Err(err)) => status_for(&err).into_response(),
        Err(join) => {
            error!(error = %join, "Provisioning task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Error bodies stay empty; detail is in the authority's logs.
pub fn status_for(err: &ProvisioningError) -> StatusCode {
    match err.kind() {
        ErrorKind::Malformed => StatusCode::BAD_REQUEST,
        ErrorKind::ProtocolState => StatusCode::CONFLICT,
        ErrorKind::ValidationFailed | ErrorKind::SecurityViolation => StatusCode::FORBIDDEN,
        ErrorKind::ValidationError | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
