use super::ids::SessionId;

pub const DEFAULT_API_BASE_URL: &str = "https://api.fintalk.fan";

/// Absolute URLs for every backend route, rooted at one base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        let base_url = if trimmed.is_empty() {
            DEFAULT_API_BASE_URL.to_string()
        } else {
            trimmed.to_string()
        };
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Browser-only OAuth entry point; the issued token is copied back by hand.
    pub fn auth_login(&self) -> String {
        format!("{}/auth/google/login", self.base_url)
    }

    pub fn characters_list(&self) -> String {
        format!("{}/characters/list", self.base_url)
    }

    pub fn characters_create(&self) -> String {
        format!("{}/characters/create", self.base_url)
    }

    pub fn sessions_list(&self) -> String {
        format!("{}/sessions/list", self.base_url)
    }

    pub fn sessions_create(&self) -> String {
        format!("{}/sessions/create", self.base_url)
    }

    pub fn session_chat(&self, session_id: &SessionId) -> String {
        format!("{}/sessions/{}/chat", self.base_url, session_id)
    }

    /// A zero or absent limit leaves the query string off entirely.
    pub fn session_query(&self, session_id: &SessionId, limit: Option<usize>) -> String {
        match limit {
            Some(limit) if limit > 0 => {
                format!("{}/sessions/{}/query?limit={limit}", self.base_url, session_id)
            }
            _ => format!("{}/sessions/{}/query", self.base_url, session_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_routes_from_normalized_base() {
        let endpoints = Endpoints::new(" http://localhost:8080/ ");
        let session = SessionId::parse("abc").unwrap();

        assert_eq!(endpoints.characters_list(), "http://localhost:8080/characters/list");
        assert_eq!(endpoints.session_chat(&session), "http://localhost:8080/sessions/abc/chat");
        assert_eq!(
            endpoints.session_query(&session, Some(5)),
            "http://localhost:8080/sessions/abc/query?limit=5"
        );
        assert_eq!(
            endpoints.session_query(&session, Some(0)),
            "http://localhost:8080/sessions/abc/query"
        );
    }

    #[test]
    fn blank_base_falls_back_to_default() {
        assert_eq!(
            Endpoints::new("  ").auth_login(),
            "https://api.fintalk.fan/auth/google/login"
        );
    }
}
