/// One line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Empty,
    Say(String),
    /// One-based index into the numbered suggestions.
    Pick(usize),
    Retry,
    Dismiss,
    Quit,
    Unknown(String),
}

impl ChatCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }

        if let Some(command) = line.strip_prefix('/') {
            return match command.trim() {
                "retry" => Self::Retry,
                "dismiss" => Self::Dismiss,
                "quit" | "exit" => Self::Quit,
                other => Self::Unknown(other.to_string()),
            };
        }

        match line.parse::<usize>() {
            Ok(index) if index > 0 => Self::Pick(index),
            _ => Self::Say(line.to_string()),
        }
    }
}
