//! Conversation model and streamed-turn reconciliation for FinTalk chats.

pub mod conversation;
pub mod error;
pub mod events;
pub mod phase;
pub mod reconciler;
pub mod suggestions;
pub mod turn;

pub use conversation::Conversation;
pub use error::{ChatError, ChatResult};
pub use events::ChatUpdate;
pub use phase::{PhaseRejection, PhaseTransition, TurnPhase};
pub use reconciler::{DEFAULT_HISTORY_LIMIT, TurnOutcome, TurnReconciler};
pub use suggestions::{Suggestion, Suggestions};
pub use turn::{StoryArc, Turn, TurnStatus};
