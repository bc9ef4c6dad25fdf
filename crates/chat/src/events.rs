use fintalk_api::StreamTarget;

use crate::suggestions::Suggestions;
use crate::turn::{StoryArc, Turn};

/// Observable changes published by the reconciler, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    /// Full conversation after a history load, oldest first.
    HistoryLoaded(Vec<Turn>),
    DraftAppended(Turn),
    StreamOpened {
        target: StreamTarget,
        auto_start: bool,
    },
    /// Snapshot of the live arc after a scenario or dialog event.
    LiveArc(StoryArc),
    TurnFinalized(Turn),
    RolledBack {
        target: StreamTarget,
        message: String,
    },
    Abandoned(StreamTarget),
    SuggestionsChanged(Suggestions),
}
