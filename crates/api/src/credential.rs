use std::fmt;

use snafu::ensure;

use super::error::{ApiResult, EmptyTokenSnafu};

const PREVIEW_CHARS: usize = 20;

/// Bearer credential handed explicitly to every client.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Accepts a pasted token, tolerating surrounding whitespace and a leading `Bearer `.
    pub fn parse(raw: &str) -> ApiResult<Self> {
        let trimmed = raw.trim();
        let token = trimmed
            .strip_prefix("Bearer ")
            .or_else(|| trimmed.strip_prefix("bearer "))
            .unwrap_or(trimmed)
            .trim();
        ensure!(
            !token.is_empty(),
            EmptyTokenSnafu {
                stage: "parse-bearer-token",
            }
        );
        Ok(Self(token.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn preview(&self) -> String {
        let prefix: String = self.0.chars().take(PREVIEW_CHARS).collect();
        format!("{prefix}...")
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("BearerToken(<redacted>)")
    }
}
