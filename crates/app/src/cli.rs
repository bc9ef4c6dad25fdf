use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "fintalk", version, about = "Terminal client for FinTalk story chats")]
pub struct Cli {
    /// Settings file to use instead of the per-user default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL for this invocation only.
    #[arg(long, global = true)]
    pub api_base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store an auth token obtained from the browser login.
    Login {
        /// Token to store. Prompted for when omitted.
        #[arg(long)]
        token: Option<String>,
    },
    /// Forget the stored auth token.
    Logout,
    #[command(subcommand)]
    Characters(CharactersCommand),
    #[command(subcommand)]
    Sessions(SessionsCommand),
    /// Open an interactive chat in an existing session.
    Chat { session_id: String },
}

#[derive(Debug, Subcommand)]
pub enum CharactersCommand {
    List,
    Create(CreateCharacterArgs),
}

#[derive(Debug, Args)]
pub struct CreateCharacterArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub background: String,
    #[arg(long)]
    pub scenario: String,
    #[arg(long)]
    pub user_role: String,
    /// Repeat for several genres.
    #[arg(long = "genre", required = true)]
    pub genres: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum SessionsCommand {
    List,
    Create(CreateSessionArgs),
}

#[derive(Debug, Args)]
pub struct CreateSessionArgs {
    #[arg(long)]
    pub character: String,
    /// Defaults to the character's background template.
    #[arg(long)]
    pub background: Option<String>,
    #[arg(long)]
    pub scenario: Option<String>,
    #[arg(long)]
    pub user_role: Option<String>,
    /// Create the session without entering the chat.
    #[arg(long)]
    pub no_chat: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_session_create_with_overrides() {
        let cli = Cli::try_parse_from([
            "fintalk",
            "sessions",
            "create",
            "--character",
            "c-1",
            "--scenario",
            "The docks",
            "--no-chat",
        ])
        .unwrap();

        let Command::Sessions(SessionsCommand::Create(args)) = cli.command else {
            panic!("expected sessions create");
        };
        assert_eq!(args.character, "c-1");
        assert_eq!(args.scenario.as_deref(), Some("The docks"));
        assert_eq!(args.background, None);
        assert!(args.no_chat);
    }

    #[test]
    fn character_create_collects_repeated_genres() {
        let cli = Cli::try_parse_from([
            "fintalk",
            "--api-base-url",
            "http://localhost:8000",
            "characters",
            "create",
            "--name",
            "Mira",
            "--background",
            "bg",
            "--scenario",
            "sc",
            "--user-role",
            "role",
            "--genre",
            "noir",
            "--genre",
            "mystery",
        ])
        .unwrap();

        assert_eq!(cli.api_base_url.as_deref(), Some("http://localhost:8000"));
        let Command::Characters(CharactersCommand::Create(args)) = cli.command else {
            panic!("expected characters create");
        };
        assert_eq!(args.genres, vec!["noir".to_string(), "mystery".to_string()]);
    }
}
