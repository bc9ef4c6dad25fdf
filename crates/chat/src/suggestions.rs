use std::fmt;

use crate::turn::Turn;

/// One suggested next move offered under the latest response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestion {
    Action(String),
    Dialog(String),
}

impl Suggestion {
    /// Text sent as the next turn's input. Actions are wrapped in asterisks.
    pub fn to_user_input(&self) -> String {
        match self {
            Self::Action(action) => format!("*{action}*"),
            Self::Dialog(dialog) => dialog.clone(),
        }
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(action) => write!(f, "*{action}*"),
            Self::Dialog(dialog) => write!(f, "\"{dialog}\""),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suggestions {
    pub actions: Vec<String>,
    pub dialogs: Vec<String>,
}

impl Suggestions {
    pub fn from_turn(turn: &Turn) -> Self {
        Self {
            actions: turn.suggested_actions.clone(),
            dialogs: turn.suggested_dialogs.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.dialogs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len() + self.dialogs.len()
    }

    /// Actions first, then dialogs, in server order.
    pub fn iter(&self) -> impl Iterator<Item = Suggestion> + '_ {
        self.actions
            .iter()
            .cloned()
            .map(Suggestion::Action)
            .chain(self.dialogs.iter().cloned().map(Suggestion::Dialog))
    }

    /// Looks up a suggestion by its zero-based position in [`Suggestions::iter`] order.
    pub fn get(&self, index: usize) -> Option<Suggestion> {
        self.iter().nth(index)
    }
}
