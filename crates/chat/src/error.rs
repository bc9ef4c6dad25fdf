use fintalk_api::ApiError;
use snafu::Snafu;

use crate::phase::PhaseRejection;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("failed to load chat history on `{stage}`, {source}"))]
    History {
        stage: &'static str,
        source: ApiError,
    },
    #[snafu(display("failed to open turn stream on `{stage}`, {source}"))]
    OpenStream {
        stage: &'static str,
        source: ApiError,
    },
    #[snafu(display("{message}"))]
    TurnFailed {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("turn transition rejected on `{stage}`, {rejection}"))]
    Transition {
        stage: &'static str,
        rejection: PhaseRejection,
    },
    #[snafu(display("history cannot be reloaded while a turn is in flight"))]
    Busy { stage: &'static str },
}

impl ChatError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::History { stage, .. }
            | Self::OpenStream { stage, .. }
            | Self::TurnFailed { stage, .. }
            | Self::Transition { stage, .. }
            | Self::Busy { stage } => stage,
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
