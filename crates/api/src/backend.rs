use std::future::Future;
use std::pin::Pin;

use crate::error::ApiResult;
use crate::ids::SessionId;
use crate::stream::{StreamTarget, TurnStreamHandle};
use crate::types::{ChatTurnBody, TurnRecord};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub target: StreamTarget,
    pub user_input: Option<String>,
}

impl TurnRequest {
    pub fn new(target: StreamTarget, user_input: Option<String>) -> Self {
        Self { target, user_input }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.target.session_id
    }

    pub fn body(&self) -> ChatTurnBody {
        ChatTurnBody {
            user_input: self.user_input.clone(),
        }
    }
}

/// Backend surface the chat layer depends on.
pub trait ChatBackend: Send + Sync {
    /// Returns stored turns newest-first, exactly as the backend orders them.
    fn fetch_history<'a>(
        &'a self,
        session_id: &'a SessionId,
        limit: Option<usize>,
    ) -> BoxFuture<'a, ApiResult<Vec<TurnRecord>>>;

    /// Opens one chat turn stream. The worker in the handle must be spawned by the caller.
    fn stream_turn(&self, request: TurnRequest) -> ApiResult<TurnStreamHandle>;
}
