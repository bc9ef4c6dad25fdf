use fintalk_api::{ArcId, ArcRecord, TurnId, TurnRecord};

/// Scenario text plus the ordered dialog lines spoken inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryArc {
    pub id: ArcId,
    pub scenario: String,
    pub dialogs: Vec<String>,
}

impl StoryArc {
    /// Empty arc used as streaming scratch state; never part of a conversation.
    pub fn scratch() -> Self {
        Self {
            id: ArcId::provisional(),
            scenario: String::new(),
            dialogs: Vec::new(),
        }
    }

    pub fn replace_scenario(&mut self, scenario: impl Into<String>) {
        self.scenario = scenario.into();
    }

    pub fn push_dialog(&mut self, dialog: impl Into<String>) {
        self.dialogs.push(dialog.into());
    }
}

impl From<ArcRecord> for StoryArc {
    fn from(record: ArcRecord) -> Self {
        Self {
            id: record.arc_id,
            scenario: record.scenario,
            dialogs: record.dialogs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnStatus {
    /// Speculative user turn waiting for its response.
    Draft,
    Finalized,
}

/// One exchange: optional user input and the character's response arcs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub id: TurnId,
    pub user_input: Option<String>,
    pub arcs: Vec<StoryArc>,
    pub story_progression: String,
    pub suggested_actions: Vec<String>,
    pub suggested_dialogs: Vec<String>,
    pub status: TurnStatus,
}

impl Turn {
    pub fn draft(user_input: impl Into<String>) -> Self {
        Self {
            id: TurnId::provisional(),
            user_input: Some(user_input.into()),
            arcs: Vec::new(),
            story_progression: String::new(),
            suggested_actions: Vec::new(),
            suggested_dialogs: Vec::new(),
            status: TurnStatus::Draft,
        }
    }

    /// Builds the finalized turn from the server record and the input that was actually sent.
    pub fn finalized(record: TurnRecord, user_input: Option<String>) -> Self {
        let mut turn = Self::from(record);
        turn.user_input = user_input;
        turn
    }

    pub fn is_draft(&self) -> bool {
        self.status == TurnStatus::Draft
    }

    pub fn has_arcs(&self) -> bool {
        !self.arcs.is_empty()
    }
}

impl From<TurnRecord> for Turn {
    fn from(record: TurnRecord) -> Self {
        Self {
            id: record.turn_id,
            user_input: record.user_input,
            arcs: record.arcs.into_iter().map(StoryArc::from).collect(),
            story_progression: record.story_progression,
            suggested_actions: record.suggested_actions,
            suggested_dialogs: record.suggested_dialogs,
            status: TurnStatus::Finalized,
        }
    }
}
