use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::error::{ApiResult, ValidationSnafu};
use super::ids::{AccountId, ArcId, CharacterId, SessionId, TurnId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: CharacterId,
    pub name: String,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default)]
    pub background_template: String,
    #[serde(default)]
    pub scenario_template: String,
    #[serde(default)]
    pub user_role_template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCharacter {
    pub name: String,
    pub background_template: String,
    pub scenario_template: String,
    pub user_role_template: String,
    pub genre: Vec<String>,
}

impl NewCharacter {
    /// Trims every field, drops blank genres and rejects incomplete forms.
    pub fn normalized(mut self) -> ApiResult<Self> {
        self.name = self.name.trim().to_string();
        self.background_template = self.background_template.trim().to_string();
        self.scenario_template = self.scenario_template.trim().to_string();
        self.user_role_template = self.user_role_template.trim().to_string();

        ensure!(
            !self.name.is_empty()
                && !self.background_template.is_empty()
                && !self.scenario_template.is_empty()
                && !self.user_role_template.is_empty(),
            ValidationSnafu {
                stage: "validate-new-character",
                details: "All fields are required",
            }
        );

        self.genre = self
            .genre
            .into_iter()
            .map(|genre| genre.trim().to_string())
            .filter(|genre| !genre.is_empty())
            .collect();
        ensure!(
            !self.genre.is_empty(),
            ValidationSnafu {
                stage: "validate-new-character",
                details: "At least one genre is required",
            }
        );

        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedCharacter {
    pub character_id: CharacterId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    #[serde(default)]
    pub account_id: Option<AccountId>,
    pub character_id: CharacterId,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub user_role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub character_id: CharacterId,
    pub background: String,
    pub scenario: String,
    pub user_role: String,
}

impl NewSession {
    /// Pre-fills the session form from the character's templates.
    pub fn from_character(character: &CharacterRecord) -> Self {
        Self {
            character_id: character.id.clone(),
            background: character.background_template.clone(),
            scenario: character.scenario_template.clone(),
            user_role: character.user_role_template.clone(),
        }
    }

    pub fn normalized(mut self) -> ApiResult<Self> {
        self.background = self.background.trim().to_string();
        self.scenario = self.scenario.trim().to_string();
        self.user_role = self.user_role.trim().to_string();

        ensure!(
            !self.background.is_empty() && !self.scenario.is_empty() && !self.user_role.is_empty(),
            ValidationSnafu {
                stage: "validate-new-session",
                details: "All fields are required",
            }
        );

        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedSession {
    pub session_id: SessionId,
}

/// One scenario block plus the dialog lines spoken inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcRecord {
    pub arc_id: ArcId,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub dialogs: Vec<String>,
}

/// Persisted turn as returned by the history query and the `complete` stream frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    #[serde(rename = "item_id", alias = "turn_id")]
    pub turn_id: TurnId,
    #[serde(default)]
    pub arcs: Vec<ArcRecord>,
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default)]
    pub story_progression: String,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default)]
    pub suggested_dialogs: Vec<String>,
}

/// Body of `POST /sessions/{id}/chat`; `None` asks the backend to open the story itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurnBody {
    pub user_input: Option<String>,
}
