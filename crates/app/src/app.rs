use std::sync::Arc;

use fintalk_api::{
    BackendClient, BearerToken, CharacterId, CharacterRecord, Endpoints, NewCharacter, NewSession,
    SessionId, SessionRecord,
};
use snafu::{OptionExt, ResultExt};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::ChatView;
use crate::cli::{
    CharactersCommand, Cli, Command, CreateCharacterArgs, CreateSessionArgs, SessionsCommand,
};
use crate::error::{
    ApiSnafu, AppResult, CharacterNotFoundSnafu, NotLoggedInSnafu, ReadInputSnafu, SettingsSnafu,
};
use crate::settings::SettingsStore;

/// Resolved command context: settings plus the backend the invocation talks to.
pub struct App {
    store: SettingsStore,
    endpoints: Endpoints,
}

impl App {
    pub fn new(store: SettingsStore, api_base_url: Option<String>) -> Self {
        let endpoints = match api_base_url {
            Some(base_url) => Endpoints::new(base_url),
            None => store.settings().endpoints(),
        };
        Self { store, endpoints }
    }

    pub fn from_cli(cli: &Cli) -> Self {
        let store = match &cli.config {
            Some(path) => SettingsStore::new(path.clone()),
            None => SettingsStore::load(),
        };
        Self::new(store, cli.api_base_url.clone())
    }

    pub async fn run(&self, command: Command) -> AppResult<()> {
        match command {
            Command::Login { token } => self.login(token).await,
            Command::Logout => self.logout(),
            Command::Characters(CharactersCommand::List) => self.list_characters().await,
            Command::Characters(CharactersCommand::Create(args)) => {
                self.create_character(args).await
            }
            Command::Sessions(SessionsCommand::List) => self.list_sessions().await,
            Command::Sessions(SessionsCommand::Create(args)) => self.create_session(args).await,
            Command::Chat { session_id } => {
                let session_id = SessionId::parse(&session_id).context(ApiSnafu {
                    stage: "parse-session-id",
                })?;
                self.chat(session_id).await
            }
        }
    }

    async fn login(&self, token: Option<String>) -> AppResult<()> {
        let raw = match token {
            Some(token) => token,
            None => {
                println!("Sign in at {}", self.endpoints.auth_login());
                println!("then paste the issued token here:");
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                lines
                    .next_line()
                    .await
                    .context(ReadInputSnafu {
                        stage: "read-login-token",
                    })?
                    .unwrap_or_default()
            }
        };

        let token = BearerToken::parse(&raw).context(ApiSnafu {
            stage: "parse-login-token",
        })?;
        self.store.login(&token).context(SettingsSnafu {
            stage: "store-login-token",
        })?;
        println!("logged in ({})", token.preview());
        Ok(())
    }

    fn logout(&self) -> AppResult<()> {
        let was_logged_in = self.store.logout().context(SettingsSnafu {
            stage: "clear-login-token",
        })?;
        if was_logged_in {
            println!("logged out");
        } else {
            println!("not logged in");
        }
        Ok(())
    }

    async fn list_characters(&self) -> AppResult<()> {
        let characters = self
            .client()?
            .list_characters()
            .await
            .context(ApiSnafu {
                stage: "list-characters",
            })?;
        if characters.is_empty() {
            println!("no characters yet");
        }
        for character in &characters {
            println!("{}", character_line(character));
        }
        Ok(())
    }

    async fn create_character(&self, args: CreateCharacterArgs) -> AppResult<()> {
        let input = NewCharacter {
            name: args.name,
            background_template: args.background,
            scenario_template: args.scenario,
            user_role_template: args.user_role,
            genre: args.genres,
        };
        let character_id = self
            .client()?
            .create_character(input)
            .await
            .context(ApiSnafu {
                stage: "create-character",
            })?;
        println!("created character {character_id}");
        Ok(())
    }

    async fn list_sessions(&self) -> AppResult<()> {
        let sessions = self.client()?.list_sessions().await.context(ApiSnafu {
            stage: "list-sessions",
        })?;
        if sessions.is_empty() {
            println!("no sessions yet");
        }
        for session in &sessions {
            println!("{}", session_line(session));
        }
        Ok(())
    }

    async fn create_session(&self, args: CreateSessionArgs) -> AppResult<()> {
        let client = self.client()?;
        let character_id = CharacterId::parse(&args.character).context(ApiSnafu {
            stage: "parse-character-id",
        })?;
        let characters = client.list_characters().await.context(ApiSnafu {
            stage: "list-characters",
        })?;
        let character = characters
            .iter()
            .find(|character| character.id == character_id)
            .context(CharacterNotFoundSnafu {
                stage: "find-session-character",
                id: character_id.to_string(),
            })?;

        let input = session_form(character, &args);
        let session_id = client.create_session(input).await.context(ApiSnafu {
            stage: "create-session",
        })?;
        println!("created session {session_id}");

        if args.no_chat {
            return Ok(());
        }
        self.chat(session_id).await
    }

    async fn chat(&self, session_id: SessionId) -> AppResult<()> {
        let history_limit = self.store.settings().history_limit;
        let client = Arc::new(self.client()?);
        ChatView::new(client, session_id, history_limit, std::io::stdout())
            .run()
            .await
    }

    fn client(&self) -> AppResult<BackendClient> {
        let token = self
            .store
            .settings()
            .bearer_token()
            .context(NotLoggedInSnafu {
                stage: "load-auth-token",
            })?;
        BackendClient::new(self.endpoints.clone(), token).context(ApiSnafu {
            stage: "build-backend-client",
        })
    }
}

/// Session form prefilled from the character's templates, with explicit flags taking precedence.
fn session_form(character: &CharacterRecord, args: &CreateSessionArgs) -> NewSession {
    let mut form = NewSession::from_character(character);
    if let Some(background) = &args.background {
        form.background = background.clone();
    }
    if let Some(scenario) = &args.scenario {
        form.scenario = scenario.clone();
    }
    if let Some(user_role) = &args.user_role {
        form.user_role = user_role.clone();
    }
    form
}

fn character_line(character: &CharacterRecord) -> String {
    format!(
        "{}  {}  [{}]",
        character.id,
        character.name,
        character.genre.join(", ")
    )
}

fn session_line(session: &SessionRecord) -> String {
    format!(
        "{}  character {}  {}",
        session.id, session.character_id, session.scenario
    )
}
