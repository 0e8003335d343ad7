/// Request extractors.
///
/// [`LedgerClient`] hands the configured ledger to a handler, rejecting
/// with 503 when ledger initialization failed at startup.
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::{api_error, ApiError};
use super::AppState;
use crate::error::AnchorError;
use crate::ledger::Ledger;

/// Use this as an extractor in route handlers that need the ledger:
/// ```ignore
/// async fn handler(LedgerClient(ledger): LedgerClient) -> impl IntoResponse { ... }
/// ```
#[derive(Clone)]
pub struct LedgerClient(pub Arc<dyn Ledger>);

impl FromRequestParts<Arc<AppState>> for LedgerClient {
    type Rejection = ApiError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        state
            .ledger
            .clone()
            .map(LedgerClient)
            .ok_or_else(|| api_error(AnchorError::LedgerUnavailable))
    }
}
