#![deny(unsafe_code)]

//! Typed client for the FinTalk backend.
//!
//! Covers the REST surface (characters, sessions, turn history) and the streamed chat turn,
//! whose newline-framed `data:` events are decoded by [`stream::FrameDecoder`].

pub mod backend;
pub mod client;
pub mod credential;
pub mod endpoints;
pub mod error;
pub mod ids;
pub mod stream;
pub mod types;

pub use backend::{BoxFuture, ChatBackend, TurnRequest};
pub use client::BackendClient;
pub use credential::BearerToken;
pub use endpoints::{DEFAULT_API_BASE_URL, Endpoints};
pub use error::{ApiError, ApiResult};
pub use ids::{AccountId, ArcId, CharacterId, SessionId, TurnId};
pub use stream::{
    FrameDecoder, StreamEvent, StreamId, StreamTarget, TurnEventStream, TurnStreamEvent,
    TurnStreamHandle, TurnStreamPayload, TurnWorker, make_event_stream,
};
pub use types::{
    ArcRecord, CharacterRecord, ChatTurnBody, CreatedCharacter, CreatedSession, NewCharacter,
    NewSession, SessionRecord, TurnRecord,
};
