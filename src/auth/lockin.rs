use axum::{debug_handler, Json};
use tower_sessions::Session;

use crate::{accounts::ContactView, session::USER_ID, AppResult, AppState};

use super::Identity;

/// Trades a bearer token for a cookie session.
#[debug_handler(state = AppState)]
pub async fn lockin(
    Identity(account): Identity,
    session: Session,
) -> AppResult<Json<ContactView>> {
    session.cycle_id().await?;
    session.insert(USER_ID, account.id).await?;

    tracing::info!(user_id = account.id, "locked in");
    Ok(Json(ContactView::from(&account)))
}
