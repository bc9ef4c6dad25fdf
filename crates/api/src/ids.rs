use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::error::{ApiError, ApiResult, InvalidIdSnafu};

// Backend ids are opaque strings; every wrapper shares the same parsing and display rules.
macro_rules! define_api_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> ApiResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty() && !trimmed.contains('/'),
                    InvalidIdSnafu {
                        stage: "parse-api-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First eight characters, used for compact headers.
            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(8) {
                    Some((end, _)) => &self.0[..end],
                    None => &self.0,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ApiError;

            fn try_from(raw: String) -> ApiResult<Self> {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = ApiError;

            fn from_str(raw: &str) -> ApiResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_api_id!(CharacterId, "character-id");
define_api_id!(SessionId, "session-id");
define_api_id!(AccountId, "account-id");

/// Identifier of one conversation turn (`item_id` on the wire).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TurnId(pub i64);

impl TurnId {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Client-side id for a speculative turn, replaced by the server id on completion.
    pub fn provisional() -> Self {
        Self(current_unix_timestamp_millis())
    }
}

/// Identifier of one arc inside a turn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ArcId(pub i64);

impl ArcId {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn provisional() -> Self {
        Self(current_unix_timestamp_millis())
    }
}

fn current_unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
