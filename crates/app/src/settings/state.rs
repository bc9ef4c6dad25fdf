use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use fintalk_api::{BearerToken, DEFAULT_API_BASE_URL, Endpoints};
use fintalk_chat::DEFAULT_HISTORY_LIMIT;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "fintalk";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "FINTALK_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            auth_token: None,
            history_limit: default_history_limit(),
        }
    }
}

impl AppSettings {
    pub fn normalized(mut self) -> Self {
        self.api_base_url = Endpoints::new(self.api_base_url).base_url().to_string();
        self.auth_token = self
            .auth_token
            .and_then(|token| BearerToken::parse(&token).ok())
            .map(|token| token.expose().to_string());
        if self.history_limit == 0 {
            self.history_limit = default_history_limit();
        }
        self
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(self.api_base_url.clone())
    }

    pub fn bearer_token(&self) -> Option<BearerToken> {
        self.auth_token
            .as_deref()
            .and_then(|token| BearerToken::parse(token).ok())
    }

    pub fn with_token(mut self, token: &BearerToken) -> Self {
        self.auth_token = Some(token.expose().to_string());
        self
    }

    pub fn without_token(mut self) -> Self {
        self.auth_token = None;
        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<AppSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".fintalk"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        Self::with_env_prefix(config_path, ENV_PREFIX)
    }

    /// Loads the file at `config_path`, overridden by variables named `<env_prefix><FIELD>`.
    pub fn with_env_prefix(config_path: PathBuf, env_prefix: &str) -> Self {
        let settings = Self::load_from(&config_path, Env::prefixed(env_prefix));
        Self::with_settings(config_path, settings)
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    fn with_settings(config_path: PathBuf, settings: AppSettings) -> Self {
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn settings(&self) -> Arc<AppSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: AppSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    pub fn login(&self, token: &BearerToken) -> Result<(), SettingsError> {
        let settings = self.settings().as_ref().clone().with_token(token);
        self.update(settings)?;
        tracing::info!(token = %token.preview(), "stored auth token");
        Ok(())
    }

    /// Clears the stored token. Returns whether one was present.
    pub fn logout(&self) -> Result<bool, SettingsError> {
        let settings = self.settings();
        let was_logged_in = settings.auth_token.is_some();
        self.update(settings.as_ref().clone().without_token())?;
        Ok(was_logged_in)
    }

    fn load_from(path: &Path, env: Env) -> AppSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        let figment = Figment::from(Serialized::defaults(AppSettings::default()))
            .merge(Json::file(path))
            .merge(env);

        match figment.extract::<AppSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                AppSettings::default()
            }
        }
    }

    fn persist(&self, settings: &AppSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const TEST_ENV_PREFIX: &str = "FINTALK_SETTINGS_TEST_UNUSED_";

    fn store_at(path: PathBuf) -> SettingsStore {
        SettingsStore::with_env_prefix(path, TEST_ENV_PREFIX)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let store = store_at(dir.path().join("settings.json"));

        assert_eq!(*store.settings(), AppSettings::default());
        assert!(store.settings().bearer_token().is_none());
    }

    #[test]
    fn login_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = store_at(path.clone());

        store
            .login(&BearerToken::parse("Bearer abc.def").unwrap())
            .unwrap();

        let reloaded = store_at(path.clone());
        assert_eq!(reloaded.settings().auth_token.as_deref(), Some("abc.def"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn logout_clears_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = store_at(path.clone());
        store.login(&BearerToken::parse("abc").unwrap()).unwrap();

        assert!(store.logout().unwrap());
        assert!(!store.logout().unwrap());

        assert_eq!(store_at(path).settings().auth_token, None);
    }

    #[test]
    fn file_values_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"api_base_url": " http://localhost:8000/ ", "auth_token": "   ", "history_limit": 0}"#,
        )
        .unwrap();

        let settings = store_at(path).settings();

        assert_eq!(settings.api_base_url, "http://localhost:8000");
        assert_eq!(settings.auth_token, None);
        assert_eq!(settings.history_limit, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(*store_at(path).settings(), AppSettings::default());
    }
}
