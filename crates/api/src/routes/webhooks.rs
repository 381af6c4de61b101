//! Webhook subscription endpoints

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiError, state::AppState, webhooks::DeliveryOutcome};

/// Fire one synchronous test delivery against a subscription so an
/// operator can verify the endpoint before relying on it
pub async fn test_subscription(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<DeliveryOutcome>, ApiError> {
    if !auth.is_staff() {
        return Err(ApiError::Forbidden);
    }

    let outcome = state.webhooks.send_test(subscription_id).await?;
    Ok(Json(outcome))
}
