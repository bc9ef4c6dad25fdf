use std::fmt;

use fintalk_api::StreamTarget;

/// Lifecycle of the single in-flight turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    /// A draft user turn was appended; the stream has not been opened yet.
    Drafted(StreamTarget),
    Streaming(StreamTarget),
    Finalized(StreamTarget),
    RolledBack {
        target: StreamTarget,
        message: String,
    },
    Abandoned(StreamTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransition {
    Draft(StreamTarget),
    Start(StreamTarget),
    Complete(StreamTarget),
    Fail {
        target: StreamTarget,
        message: String,
    },
    Abandon(StreamTarget),
}

/// Rejection reason for illegal turn transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseRejection {
    AlreadyInFlight {
        active: StreamTarget,
        attempted: StreamTarget,
    },
    NoActiveTurn,
    NotStreaming(StreamTarget),
    TargetMismatch {
        active: StreamTarget,
        attempted: StreamTarget,
    },
}

impl fmt::Display for PhaseRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInFlight { active, attempted } => write!(
                f,
                "stream {} is in flight, refused stream {}",
                active.stream_id.0, attempted.stream_id.0
            ),
            Self::NoActiveTurn => f.write_str("no turn is in flight"),
            Self::NotStreaming(target) => {
                write!(f, "stream {} was never opened", target.stream_id.0)
            }
            Self::TargetMismatch { active, attempted } => write!(
                f,
                "stream {} does not match active stream {}",
                attempted.stream_id.0, active.stream_id.0
            ),
        }
    }
}

pub type PhaseTransitionResult = Result<TurnPhase, PhaseRejection>;

impl TurnPhase {
    /// Target of the drafted or streaming turn, if any.
    pub fn in_flight(&self) -> Option<&StreamTarget> {
        match self {
            Self::Drafted(target) | Self::Streaming(target) => Some(target),
            Self::Idle | Self::Finalized(_) | Self::RolledBack { .. } | Self::Abandoned(_) => None,
        }
    }

    /// Returns true when an incoming stream event belongs to the open stream.
    pub fn accepts_stream_event(&self, target: &StreamTarget) -> bool {
        matches!(self, Self::Streaming(active) if active == target)
    }

    /// Applies one transition deterministically.
    ///
    /// Only one turn may be in flight. `Start` may follow `Draft` for the same target or open
    /// an input-less turn from any settled phase. Terminal transitions must name the in-flight
    /// target exactly.
    pub fn apply(&self, transition: PhaseTransition) -> PhaseTransitionResult {
        match transition {
            PhaseTransition::Draft(target) => self.apply_draft(target),
            PhaseTransition::Start(target) => self.apply_start(target),
            PhaseTransition::Complete(target) => self.apply_complete(target),
            PhaseTransition::Fail { target, message } => self.apply_fail(target, message),
            PhaseTransition::Abandon(target) => self.apply_abandon(target),
        }
    }

    fn apply_draft(&self, target: StreamTarget) -> PhaseTransitionResult {
        match self.in_flight() {
            Some(active) => Err(PhaseRejection::AlreadyInFlight {
                active: active.clone(),
                attempted: target,
            }),
            None => Ok(Self::Drafted(target)),
        }
    }

    fn apply_start(&self, target: StreamTarget) -> PhaseTransitionResult {
        match self {
            Self::Drafted(active) | Self::Streaming(active) if *active == target => {
                Ok(Self::Streaming(target))
            }
            Self::Drafted(active) | Self::Streaming(active) => {
                Err(PhaseRejection::AlreadyInFlight {
                    active: active.clone(),
                    attempted: target,
                })
            }
            Self::Idle | Self::Finalized(_) | Self::RolledBack { .. } | Self::Abandoned(_) => {
                Ok(Self::Streaming(target))
            }
        }
    }

    fn apply_complete(&self, target: StreamTarget) -> PhaseTransitionResult {
        match self {
            Self::Streaming(active) if *active == target => Ok(Self::Finalized(target)),
            Self::Streaming(active) => Err(PhaseRejection::TargetMismatch {
                active: active.clone(),
                attempted: target,
            }),
            Self::Drafted(_) => Err(PhaseRejection::NotStreaming(target)),
            Self::Idle | Self::Finalized(_) | Self::RolledBack { .. } | Self::Abandoned(_) => {
                Err(PhaseRejection::NoActiveTurn)
            }
        }
    }

    fn apply_fail(&self, target: StreamTarget, message: String) -> PhaseTransitionResult {
        self.settle_in_flight(target, |target| Self::RolledBack { target, message })
    }

    fn apply_abandon(&self, target: StreamTarget) -> PhaseTransitionResult {
        self.settle_in_flight(target, Self::Abandoned)
    }

    fn settle_in_flight(
        &self,
        target: StreamTarget,
        settled: impl FnOnce(StreamTarget) -> Self,
    ) -> PhaseTransitionResult {
        match self {
            Self::Drafted(active) | Self::Streaming(active) if *active == target => {
                Ok(settled(target))
            }
            Self::Drafted(active) | Self::Streaming(active) => {
                Err(PhaseRejection::TargetMismatch {
                    active: active.clone(),
                    attempted: target,
                })
            }
            Self::Idle | Self::Finalized(_) | Self::RolledBack { .. } | Self::Abandoned(_) => {
                Err(PhaseRejection::NoActiveTurn)
            }
        }
    }
}
