mod codec;
mod history;
mod registry;
mod room;
mod session;
mod store;

use axum::{routing::get, Router};

use crate::AppState;

pub use codec::{decode, Frame, Inbound, Outbound};
pub use history::MessageView;
pub use registry::{ConnId, Membership, Registrant, Registry};
pub use room::RoomKey;
pub use session::{Session, SessionState, NOT_SAVED};
pub use store::{Message, MessageStore};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/chat/{user_id}", get(session::chat_ws))
        .route(
            "/api/chat/{user_id}/messages",
            get(history::history).post(history::post_message),
        )
}
