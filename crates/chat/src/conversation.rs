use fintalk_api::{SessionId, StreamTarget, TurnRecord};

use crate::error::{ChatResult, TransitionSnafu};
use crate::phase::{PhaseTransition, TurnPhase};
use crate::suggestions::Suggestions;
use crate::turn::Turn;

/// Ordered turns of one session, oldest first.
///
/// At most one turn is a draft, and only ever the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    session_id: SessionId,
    turns: Vec<Turn>,
    phase: TurnPhase,
}

impl Conversation {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            turns: Vec::new(),
            phase: TurnPhase::Idle,
        }
    }

    /// Builds a conversation from backend history, which arrives newest first.
    pub fn from_history(session_id: SessionId, newest_first: Vec<TurnRecord>) -> Self {
        let turns = newest_first.into_iter().rev().map(Turn::from).collect();
        Self {
            session_id,
            turns,
            phase: TurnPhase::Idle,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    pub fn draft(&self) -> Option<&Turn> {
        self.turns.last().filter(|turn| turn.is_draft())
    }

    /// True once any finalized turn carries at least one arc.
    pub fn has_opening_response(&self) -> bool {
        self.turns
            .iter()
            .any(|turn| !turn.is_draft() && turn.has_arcs())
    }

    /// Most recent finalized turn that carries arcs.
    pub fn latest_response(&self) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|turn| !turn.is_draft() && turn.has_arcs())
    }

    pub fn suggestions(&self) -> Suggestions {
        self.latest_response()
            .map(Suggestions::from_turn)
            .unwrap_or_default()
    }

    pub(crate) fn begin_draft(&mut self, target: StreamTarget, user_input: String) -> ChatResult<&Turn> {
        self.transition("begin-draft", PhaseTransition::Draft(target))?;
        self.turns.push(Turn::draft(user_input));
        let index = self.turns.len() - 1;
        Ok(&self.turns[index])
    }

    pub(crate) fn begin_stream(&mut self, target: StreamTarget) -> ChatResult<()> {
        self.transition("begin-stream", PhaseTransition::Start(target))
    }

    /// Replaces the draft with the finalized turn, or appends it when no draft exists.
    pub(crate) fn finalize(
        &mut self,
        target: StreamTarget,
        record: TurnRecord,
        user_input: Option<String>,
    ) -> ChatResult<&Turn> {
        self.transition("finalize-turn", PhaseTransition::Complete(target))?;
        let turn = Turn::finalized(record, user_input);
        match self.turns.last_mut() {
            Some(last) if last.is_draft() => *last = turn,
            _ => self.turns.push(turn),
        }
        let index = self.turns.len() - 1;
        Ok(&self.turns[index])
    }

    /// Removes the draft appended for `target`, returning it.
    pub(crate) fn roll_back(&mut self, target: StreamTarget, message: String) -> ChatResult<Option<Turn>> {
        self.transition("roll-back-turn", PhaseTransition::Fail { target, message })?;
        Ok(self.pop_draft())
    }

    pub(crate) fn abandon(&mut self, target: StreamTarget) -> ChatResult<Option<Turn>> {
        self.transition("abandon-turn", PhaseTransition::Abandon(target))?;
        Ok(self.pop_draft())
    }

    fn pop_draft(&mut self) -> Option<Turn> {
        if self.turns.last().is_some_and(Turn::is_draft) {
            self.turns.pop()
        } else {
            None
        }
    }

    fn transition(&mut self, stage: &'static str, transition: PhaseTransition) -> ChatResult<()> {
        self.phase = self
            .phase
            .apply(transition)
            .map_err(|rejection| TransitionSnafu { stage, rejection }.build())?;
        Ok(())
    }
}
