use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{accounts::Account, error::ApiError, session::USER_ID, AppError, AppState};

mod lockin;
mod logout;

pub use lockin::lockin;
pub use logout::logout;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// The caller, if any. Never rejects for lack of credentials.
pub struct Caller(pub Option<Account>);

/// An authenticated caller. Rejects anonymous requests with 401.
pub struct Identity(pub Account);

fn presented_token(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_owned());

    header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token)
    })
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Ok(session) = Session::from_request_parts(parts, state).await {
            if let Some(user_id) = session.get::<i64>(USER_ID).await? {
                let account = state.directory.lookup(user_id).await?;
                if let Some(account) = account.filter(|a| a.is_active) {
                    return Ok(Caller(Some(account)));
                }
            }
        }

        let Some(token) = presented_token(parts) else {
            return Ok(Caller(None));
        };
        Ok(Caller(state.directory.authenticate(&token).await?))
    }
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Caller(account) = Caller::from_request_parts(parts, state).await?;
        account
            .map(Identity)
            .ok_or_else(|| ApiError::Unauthorized.into())
    }
}
