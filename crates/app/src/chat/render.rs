use std::io::{self, Write};

use fintalk_chat::{ChatUpdate, StoryArc, Suggestions, Turn};

/// Writes conversation state and live updates as plain text.
///
/// Live arc snapshots are printed incrementally; the finalized turn is printed in full once
/// it arrives, since its arcs may differ from what was streamed.
pub struct ChatRenderer<W> {
    out: W,
    live_scenario: String,
    live_dialogs: usize,
}

impl<W: Write> ChatRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            live_scenario: String::new(),
            live_dialogs: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn update(&mut self, update: &ChatUpdate) -> io::Result<()> {
        match update {
            ChatUpdate::HistoryLoaded(turns) => {
                for turn in turns {
                    self.turn(turn)?;
                }
            }
            ChatUpdate::DraftAppended(_) => {}
            ChatUpdate::StreamOpened { auto_start, .. } => {
                self.reset_live();
                if *auto_start {
                    writeln!(self.out, "(the story begins...)")?;
                }
            }
            ChatUpdate::LiveArc(arc) => self.live_arc(arc)?,
            ChatUpdate::TurnFinalized(turn) => {
                self.reset_live();
                writeln!(self.out, "----")?;
                self.turn(turn)?;
            }
            ChatUpdate::RolledBack { message, .. } => {
                self.reset_live();
                writeln!(self.out, "! {message}")?;
                writeln!(self.out, "  (your message was not kept; /retry reloads, /dismiss clears)")?;
            }
            ChatUpdate::Abandoned(_) => {
                self.reset_live();
                writeln!(self.out, "(turn abandoned)")?;
            }
            ChatUpdate::SuggestionsChanged(suggestions) => self.suggestions(suggestions)?,
        }
        self.out.flush()
    }

    pub fn notice(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "{message}")?;
        self.out.flush()
    }

    pub fn prompt(&mut self) -> io::Result<()> {
        write!(self.out, "> ")?;
        self.out.flush()
    }

    fn turn(&mut self, turn: &Turn) -> io::Result<()> {
        if let Some(input) = &turn.user_input {
            writeln!(self.out, "you: {input}")?;
        }
        for arc in &turn.arcs {
            self.arc(arc)?;
        }
        if !turn.story_progression.is_empty() {
            writeln!(self.out, "  ~ {}", turn.story_progression)?;
        }
        Ok(())
    }

    fn arc(&mut self, arc: &StoryArc) -> io::Result<()> {
        if !arc.scenario.is_empty() {
            writeln!(self.out, "  [{}]", arc.scenario)?;
        }
        for dialog in &arc.dialogs {
            writeln!(self.out, "  \"{dialog}\"")?;
        }
        Ok(())
    }

    fn live_arc(&mut self, arc: &StoryArc) -> io::Result<()> {
        if arc.scenario != self.live_scenario {
            self.live_scenario = arc.scenario.clone();
            writeln!(self.out, "  ... [{}]", arc.scenario)?;
        }
        for dialog in arc.dialogs.iter().skip(self.live_dialogs) {
            writeln!(self.out, "  ... \"{dialog}\"")?;
        }
        self.live_dialogs = arc.dialogs.len();
        Ok(())
    }

    fn suggestions(&mut self, suggestions: &Suggestions) -> io::Result<()> {
        for (index, suggestion) in suggestions.iter().enumerate() {
            writeln!(self.out, "  {}. {suggestion}", index + 1)?;
        }
        Ok(())
    }

    fn reset_live(&mut self) {
        self.live_scenario.clear();
        self.live_dialogs = 0;
    }
}
