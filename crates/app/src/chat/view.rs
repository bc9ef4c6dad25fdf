use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use fintalk_api::{ChatBackend, SessionId};
use fintalk_chat::{ChatResult, ChatUpdate, TurnOutcome, TurnReconciler};
use snafu::ResultExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;

use super::input::ChatCommand;
use super::render::ChatRenderer;
use crate::error::{AppResult, ReadInputSnafu, WriteOutputSnafu};

enum Driven<T> {
    Done(ChatResult<T>),
    Interrupted,
}

/// Interactive chat loop over stdin and stdout for one session.
pub struct ChatView<W> {
    reconciler: TurnReconciler,
    updates: mpsc::UnboundedReceiver<ChatUpdate>,
    renderer: ChatRenderer<W>,
}

impl<W: Write> ChatView<W> {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        session_id: SessionId,
        history_limit: usize,
        out: W,
    ) -> Self {
        let mut reconciler = TurnReconciler::new(backend, session_id).with_history_limit(history_limit);
        let updates = reconciler.subscribe();
        Self {
            reconciler,
            updates,
            renderer: ChatRenderer::new(out),
        }
    }

    pub async fn run(mut self) -> AppResult<()> {
        self.notice(&format!(
            "chatting in session {} (number picks a suggestion, /retry, /dismiss, /quit; Ctrl-C stops a reply or quits at the prompt)",
            self.reconciler.session_id().short()
        ))?;
        self.open().await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            self.renderer.prompt().context(WriteOutputSnafu {
                stage: "write-chat-prompt",
            })?;
            let Some(command) = next_command(&mut lines, tokio::signal::ctrl_c()).await? else {
                break;
            };

            match command {
                ChatCommand::Empty => {}
                ChatCommand::Quit => break,
                ChatCommand::Dismiss => self.reconciler.dismiss_error(),
                ChatCommand::Retry => self.open().await?,
                ChatCommand::Unknown(command) => {
                    self.notice(&format!("unknown command /{command}"))?;
                }
                ChatCommand::Pick(index) => {
                    match self.reconciler.visible_suggestions().get(index - 1) {
                        Some(suggestion) => self.send(suggestion.to_user_input()).await?,
                        None => self.notice(&format!("no suggestion numbered {index}"))?,
                    }
                }
                ChatCommand::Say(text) => self.send(text).await?,
            }
        }
        Ok(())
    }

    /// Reloads history and auto-starts an empty session.
    async fn open(&mut self) -> AppResult<()> {
        let driven = drive(self.reconciler.open(), &mut self.updates, &mut self.renderer).await?;
        match driven {
            Driven::Done(Ok(_)) => {
                if !self.reconciler.accepts_input() {
                    self.notice("the story has not started yet; /retry to try again")?;
                }
            }
            Driven::Done(Err(error)) => {
                tracing::warn!(stage = error.stage(), error = %error, "failed to open chat");
                self.notice(&format!("! {error} (/retry to try again)"))?;
            }
            Driven::Interrupted => self.interrupt()?,
        }
        Ok(())
    }

    async fn send(&mut self, text: String) -> AppResult<()> {
        if !self.reconciler.accepts_input() {
            return self.notice("waiting for the story to begin; /retry to reload");
        }

        let driven = drive(
            self.reconciler.send_turn(Some(text)),
            &mut self.updates,
            &mut self.renderer,
        )
        .await?;
        match driven {
            Driven::Done(Ok(TurnOutcome::Finalized(_))) => {}
            Driven::Done(Ok(TurnOutcome::Skipped)) => {
                self.notice("nothing sent")?;
            }
            // The rollback update has already been rendered.
            Driven::Done(Err(error)) => {
                tracing::debug!(stage = error.stage(), error = %error, "turn failed");
            }
            Driven::Interrupted => self.interrupt()?,
        }
        Ok(())
    }

    fn interrupt(&mut self) -> AppResult<()> {
        self.reconciler.abandon();
        self.flush_updates()
    }

    fn flush_updates(&mut self) -> AppResult<()> {
        while let Ok(update) = self.updates.try_recv() {
            self.render(&update)?;
        }
        Ok(())
    }

    fn render(&mut self, update: &ChatUpdate) -> AppResult<()> {
        self.renderer.update(update).context(WriteOutputSnafu {
            stage: "write-chat-update",
        })
    }

    fn notice(&mut self, message: &str) -> AppResult<()> {
        self.renderer.notice(message).context(WriteOutputSnafu {
            stage: "write-chat-notice",
        })
    }
}

/// Reads the next command line. `None` means quit: end of input or an interrupt at the prompt.
async fn next_command<R, I>(
    lines: &mut Lines<R>,
    interrupt: I,
) -> AppResult<Option<ChatCommand>>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        line = lines.next_line() => {
            let line = line.context(ReadInputSnafu {
                stage: "read-chat-input",
            })?;
            Ok(line.map(|line| ChatCommand::parse(&line)))
        }
        _ = interrupt => Ok(None),
    }
}

/// Polls a reconciler future while rendering its updates. Ctrl-C interrupts it.
async fn drive<F, T, W>(
    future: F,
    updates: &mut mpsc::UnboundedReceiver<ChatUpdate>,
    renderer: &mut ChatRenderer<W>,
) -> AppResult<Driven<T>>
where
    F: Future<Output = ChatResult<T>>,
    W: Write,
{
    tokio::pin!(future);
    loop {
        tokio::select! {
            result = &mut future => {
                while let Ok(update) = updates.try_recv() {
                    renderer.update(&update).context(WriteOutputSnafu {
                        stage: "write-chat-update",
                    })?;
                }
                return Ok(Driven::Done(result));
            }
            Some(update) = updates.recv() => {
                renderer.update(&update).context(WriteOutputSnafu {
                    stage: "write-chat-update",
                })?;
            }
            _ = tokio::signal::ctrl_c() => return Ok(Driven::Interrupted),
        }
    }
}
