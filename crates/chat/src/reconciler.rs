use std::sync::Arc;

use fintalk_api::{
    ChatBackend, SessionId, StreamId, StreamTarget, TurnEventStream, TurnRecord, TurnRequest,
    TurnStreamEvent, TurnStreamHandle, TurnStreamPayload,
};
use snafu::{ResultExt, ensure};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::conversation::Conversation;
use crate::error::{BusySnafu, ChatError, ChatResult, HistorySnafu, OpenStreamSnafu, TransitionSnafu};
use crate::events::ChatUpdate;
use crate::phase::PhaseRejection;
use crate::suggestions::{Suggestion, Suggestions};
use crate::turn::{StoryArc, Turn};

pub const DEFAULT_HISTORY_LIMIT: usize = 5;

const STREAM_CLOSED_EARLY: &str = "stream closed before the turn completed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Finalized(Turn),
    /// Nothing was sent: blank input or another turn already in flight.
    Skipped,
}

struct ActiveTurn {
    target: StreamTarget,
    user_input: Option<String>,
    stream: TurnEventStream,
    worker: JoinHandle<()>,
}

impl Drop for ActiveTurn {
    fn drop(&mut self) {
        self.stream.cancel();
        self.worker.abort();
    }
}

/// Owns one session's conversation and reconciles streamed turns into it.
///
/// A turn is driven in two steps: [`TurnReconciler::begin_turn`] appends the draft and spawns
/// the stream worker, then [`TurnReconciler::drive_turn`] applies events until the turn is
/// finalized or rolled back. [`TurnReconciler::send_turn`] does both.
pub struct TurnReconciler {
    backend: Arc<dyn ChatBackend>,
    conversation: Conversation,
    history_limit: Option<usize>,
    live_arc: Option<StoryArc>,
    active: Option<ActiveTurn>,
    next_stream_id: u64,
    auto_start_attempted: bool,
    error: Option<String>,
    updates: Option<mpsc::UnboundedSender<ChatUpdate>>,
}

impl TurnReconciler {
    pub fn new(backend: Arc<dyn ChatBackend>, session_id: SessionId) -> Self {
        Self {
            backend,
            conversation: Conversation::new(session_id),
            history_limit: Some(DEFAULT_HISTORY_LIMIT),
            live_arc: None,
            active: None,
            next_stream_id: 1,
            auto_start_attempted: false,
            error: None,
            updates: None,
        }
    }

    /// Caps how many turns history loading asks for. `0` requests the backend default.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = (limit > 0).then_some(limit);
        self
    }

    /// Returns a receiver for every subsequent [`ChatUpdate`]. Replaces any earlier subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChatUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.updates = Some(tx);
        rx
    }

    pub fn session_id(&self) -> &SessionId {
        self.conversation.session_id()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Arc being assembled from the open stream. Never part of the conversation.
    pub fn live_arc(&self) -> Option<&StoryArc> {
        self.live_arc.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Suggestions to offer right now: hidden while a turn is in flight.
    pub fn visible_suggestions(&self) -> Suggestions {
        if self.active.is_some() || !self.conversation.has_opening_response() {
            return Suggestions::default();
        }
        self.conversation.suggestions()
    }

    /// User input is only meaningful once the character has answered at least once.
    pub fn accepts_input(&self) -> bool {
        self.active.is_none() && self.conversation.has_opening_response()
    }

    pub fn needs_auto_start(&self) -> bool {
        self.conversation.is_empty()
            && self.active.is_none()
            && !self.auto_start_attempted
            && !self.conversation.has_opening_response()
    }

    /// Replaces the conversation with the latest backend history.
    pub async fn load_history(&mut self) -> ChatResult<usize> {
        ensure!(
            self.active.is_none(),
            BusySnafu {
                stage: "load-history"
            }
        );

        let session_id = self.conversation.session_id().clone();
        let records = self
            .backend
            .fetch_history(&session_id, self.history_limit)
            .await
            .context(HistorySnafu {
                stage: "fetch-history",
            })?;

        self.replace_history(session_id, records);
        let turns = self.conversation.len();
        tracing::info!(
            session_id = %self.conversation.session_id(),
            turns,
            "chat history loaded"
        );
        self.publish(ChatUpdate::HistoryLoaded(self.conversation.turns().to_vec()));
        self.publish(ChatUpdate::SuggestionsChanged(self.visible_suggestions()));
        Ok(turns)
    }

    /// Loads history and, for a brand-new session, asks the character to open the story.
    pub async fn open(&mut self) -> ChatResult<Option<TurnOutcome>> {
        self.load_history().await?;
        if self.needs_auto_start() {
            return self.auto_start().await.map(Some);
        }
        Ok(None)
    }

    /// Sends an input-less turn. Attempted at most once per loaded history.
    pub async fn auto_start(&mut self) -> ChatResult<TurnOutcome> {
        self.auto_start_attempted = true;
        self.send_turn(None).await
    }

    pub async fn send_suggestion(&mut self, suggestion: &Suggestion) -> ChatResult<TurnOutcome> {
        self.send_turn(Some(suggestion.to_user_input())).await
    }

    pub async fn send_turn(&mut self, user_input: Option<String>) -> ChatResult<TurnOutcome> {
        if !self.begin_turn(user_input)? {
            return Ok(TurnOutcome::Skipped);
        }
        self.drive_turn().await
    }

    /// Appends the draft and opens the stream. Returns `false` when nothing was started.
    ///
    /// Must be called within a Tokio runtime; the stream worker is spawned onto it.
    pub fn begin_turn(&mut self, user_input: Option<String>) -> ChatResult<bool> {
        if let Some(active) = &self.active {
            tracing::debug!(
                session_id = %active.target.session_id,
                stream_id = active.target.stream_id.0,
                "ignoring send while a turn is in flight"
            );
            return Ok(false);
        }

        let user_input = match user_input {
            Some(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(false);
                }
                Some(text.to_string())
            }
            None => None,
        };

        let target = self.next_target();
        if let Some(text) = &user_input {
            let draft = self
                .conversation
                .begin_draft(target.clone(), text.clone())?
                .clone();
            self.publish(ChatUpdate::DraftAppended(draft));
        }
        self.conversation.begin_stream(target.clone())?;

        let request = TurnRequest::new(target.clone(), user_input.clone());
        let TurnStreamHandle { stream, worker } = match self.backend.stream_turn(request) {
            Ok(handle) => handle,
            Err(source) => {
                self.settle_failure(&target, source.to_string());
                return Err(source).context(OpenStreamSnafu {
                    stage: "open-turn-stream",
                });
            }
        };

        tracing::debug!(
            session_id = %target.session_id,
            stream_id = target.stream_id.0,
            auto_start = user_input.is_none(),
            "turn stream opened"
        );
        self.error = None;
        self.live_arc = Some(StoryArc::scratch());
        self.publish(ChatUpdate::StreamOpened {
            target: target.clone(),
            auto_start: user_input.is_none(),
        });
        self.publish(ChatUpdate::SuggestionsChanged(Suggestions::default()));
        self.active = Some(ActiveTurn {
            target,
            user_input,
            stream,
            worker: tokio::spawn(worker),
        });
        Ok(true)
    }

    /// Applies stream events until the in-flight turn is finalized or rolled back.
    pub async fn drive_turn(&mut self) -> ChatResult<TurnOutcome> {
        loop {
            let Some(active) = self.active.as_mut() else {
                return TransitionSnafu {
                    stage: "drive-turn",
                    rejection: PhaseRejection::NoActiveTurn,
                }
                .fail();
            };

            let next = active.stream.recv().await;
            match next {
                Some(event) => {
                    if let Some(result) = self.apply_event(event) {
                        return result;
                    }
                }
                None => return Err(self.fail_active(STREAM_CLOSED_EARLY.to_string())),
            }
        }
    }

    /// Applies one stream event. Returns the turn's result once the event settled it.
    ///
    /// Events addressed to any stream other than the in-flight one are ignored.
    pub fn apply_event(&mut self, event: TurnStreamEvent) -> Option<ChatResult<TurnOutcome>> {
        let Some(active) = &self.active else {
            tracing::debug!(
                stream_id = event.target.stream_id.0,
                "dropping stream event with no turn in flight"
            );
            return None;
        };
        if active.target != event.target
            || !self.conversation.phase().accepts_stream_event(&event.target)
        {
            tracing::debug!(
                active_stream_id = active.target.stream_id.0,
                stream_id = event.target.stream_id.0,
                "dropping stale stream event"
            );
            return None;
        }

        match event.payload {
            TurnStreamPayload::Scenario(scenario) => {
                self.update_live_arc(|arc| arc.replace_scenario(scenario));
                None
            }
            TurnStreamPayload::Dialog(dialog) => {
                self.update_live_arc(|arc| arc.push_dialog(dialog));
                None
            }
            TurnStreamPayload::Complete(record) => Some(self.complete_active(record)),
            TurnStreamPayload::Error(message) => Some(Err(self.fail_active(message))),
        }
    }

    /// Cancels the in-flight turn and removes its draft. Later events from it are ignored.
    pub fn abandon(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        let target = active.target.clone();
        drop(active);

        self.live_arc = None;
        if let Err(error) = self.conversation.abandon(target.clone()) {
            tracing::warn!(stage = error.stage(), error = %error, "abandon rejected");
        }
        tracing::info!(
            session_id = %target.session_id,
            stream_id = target.stream_id.0,
            "turn abandoned"
        );
        self.publish(ChatUpdate::Abandoned(target));
        self.publish(ChatUpdate::SuggestionsChanged(self.visible_suggestions()));
        true
    }

    fn update_live_arc(&mut self, update: impl FnOnce(&mut StoryArc)) {
        let Some(arc) = self.live_arc.as_mut() else {
            return;
        };
        update(arc);
        let snapshot = arc.clone();
        self.publish(ChatUpdate::LiveArc(snapshot));
    }

    fn complete_active(&mut self, record: TurnRecord) -> ChatResult<TurnOutcome> {
        let Some(active) = self.active.take() else {
            return TransitionSnafu {
                stage: "complete-turn",
                rejection: PhaseRejection::NoActiveTurn,
            }
            .fail();
        };
        self.live_arc = None;

        let turn = self
            .conversation
            .finalize(active.target.clone(), record, active.user_input.clone())?
            .clone();
        tracing::info!(
            session_id = %active.target.session_id,
            stream_id = active.target.stream_id.0,
            turn_id = turn.id.0,
            arcs = turn.arcs.len(),
            "turn finalized"
        );
        self.publish(ChatUpdate::TurnFinalized(turn.clone()));
        self.publish(ChatUpdate::SuggestionsChanged(self.visible_suggestions()));
        Ok(TurnOutcome::Finalized(turn))
    }

    fn fail_active(&mut self, message: String) -> ChatError {
        if let Some(active) = self.active.take() {
            self.settle_failure(&active.target, message.clone());
        }
        ChatError::TurnFailed {
            stage: "stream-turn",
            message,
        }
    }

    fn settle_failure(&mut self, target: &StreamTarget, message: String) {
        self.live_arc = None;
        if let Err(error) = self.conversation.roll_back(target.clone(), message.clone()) {
            tracing::warn!(stage = error.stage(), error = %error, "roll back rejected");
        }
        tracing::warn!(
            session_id = %target.session_id,
            stream_id = target.stream_id.0,
            error = %message,
            "turn failed, draft rolled back"
        );
        self.error = Some(message.clone());
        self.publish(ChatUpdate::RolledBack {
            target: target.clone(),
            message,
        });
        self.publish(ChatUpdate::SuggestionsChanged(self.visible_suggestions()));
    }

    fn replace_history(&mut self, session_id: SessionId, records: Vec<TurnRecord>) {
        self.conversation = Conversation::from_history(session_id, records);
        self.live_arc = None;
        self.auto_start_attempted = false;
    }

    fn next_target(&mut self) -> StreamTarget {
        let stream_id = StreamId::new(self.next_stream_id);
        self.next_stream_id += 1;
        StreamTarget::new(self.conversation.session_id().clone(), stream_id)
    }

    fn publish(&mut self, update: ChatUpdate) {
        let closed = self
            .updates
            .as_ref()
            .is_some_and(|tx| tx.send(update).is_err());
        if closed {
            self.updates = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;

    use fintalk_api::{ApiError, ApiResult, ArcId, ArcRecord, BoxFuture, TurnId};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::turn::TurnStatus;

    enum Script {
        Chunks(Vec<&'static str>),
        ChunksThenError(Vec<&'static str>, &'static str),
        Pending,
        OpenError(u16),
    }

    #[derive(Default)]
    struct ScriptedBackend {
        history: Vec<TurnRecord>,
        history_status: Option<u16>,
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<TurnRequest>>,
    }

    impl ScriptedBackend {
        fn with_history(history: Vec<TurnRecord>) -> Self {
            Self {
                history,
                ..Self::default()
            }
        }

        fn script(self, script: Script) -> Self {
            self.scripts.lock().unwrap().push_back(script);
            self
        }

        fn requests(&self) -> Vec<TurnRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn fetch_history<'a>(
            &'a self,
            _session_id: &'a SessionId,
            _limit: Option<usize>,
        ) -> BoxFuture<'a, ApiResult<Vec<TurnRecord>>> {
            let result = match self.history_status {
                Some(status) => Err(ApiError::HttpStatus {
                    stage: "query-turns",
                    status,
                }),
                None => Ok(self.history.clone()),
            };
            Box::pin(async move { result })
        }

        fn stream_turn(&self, request: TurnRequest) -> ApiResult<TurnStreamHandle> {
            self.requests.lock().unwrap().push(request.clone());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Chunks(Vec::new()));
            let target = request.target;
            let handle = match script {
                Script::Chunks(chunks) => TurnStreamHandle::from_chunks(
                    target,
                    futures::stream::iter(chunks.into_iter().map(Ok::<_, io::Error>)),
                ),
                Script::ChunksThenError(chunks, message) => {
                    let items = chunks
                        .into_iter()
                        .map(Ok)
                        .chain(std::iter::once(Err(io::Error::other(message))));
                    TurnStreamHandle::from_chunks(target, futures::stream::iter(items))
                }
                Script::Pending => TurnStreamHandle::from_chunks(
                    target,
                    futures::stream::pending::<Result<&'static str, io::Error>>(),
                ),
                Script::OpenError(status) => {
                    return Err(ApiError::HttpStatus {
                        stage: "open-turn-stream",
                        status,
                    });
                }
            };
            Ok(handle)
        }
    }

    const SCENARIO: &str = "data: {\"type\":\"scenario\",\"content\":\"Rain on the docks.\"}\n\n";
    const DIALOG_HI: &str = "data: {\"type\":\"dialog\",\"content\":\"Hi\"}\n\n";
    const DIALOG_THERE: &str = "data: {\"type\":\"dialog\",\"content\":\"there\"}\n\n";
    const COMPLETE: &str = "data: {\"type\":\"complete\",\"content\":{\"item_id\":77,\"arcs\":[{\"arc_id\":3,\"scenario\":\"Rain on the docks.\",\"dialogs\":[\"Hi\",\"there\"]}],\"story_progression\":\"They meet.\",\"suggested_actions\":[\"bow\"],\"suggested_dialogs\":[\"Who are you?\"]}}\n\n";

    fn session() -> SessionId {
        SessionId::parse("s-1").unwrap()
    }

    fn opening_record() -> TurnRecord {
        TurnRecord {
            turn_id: TurnId::new(1),
            arcs: vec![ArcRecord {
                arc_id: ArcId::new(1),
                scenario: "Dawn.".to_string(),
                dialogs: vec!["Welcome.".to_string()],
            }],
            user_input: None,
            story_progression: String::new(),
            suggested_actions: vec!["look around".to_string()],
            suggested_dialogs: vec!["Hello?".to_string()],
        }
    }

    fn reconciler(backend: ScriptedBackend) -> (TurnReconciler, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let reconciler = TurnReconciler::new(backend.clone(), session());
        (reconciler, backend)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ChatUpdate>) -> Vec<ChatUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    fn live_arcs(updates: &[ChatUpdate]) -> Vec<StoryArc> {
        updates
            .iter()
            .filter_map(|update| match update {
                ChatUpdate::LiveArc(arc) => Some(arc.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn user_turn_is_drafted_then_finalized_in_place() {
        let backend = ScriptedBackend::with_history(vec![opening_record()])
            .script(Script::Chunks(vec![SCENARIO, DIALOG_HI, DIALOG_THERE, COMPLETE]));
        let (mut reconciler, backend) = reconciler(backend);
        let mut updates = reconciler.subscribe();
        reconciler.load_history().await.unwrap();

        assert!(reconciler.begin_turn(Some("  Hello ".to_string())).unwrap());
        let turns = reconciler.conversation().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].status, TurnStatus::Draft);
        assert_eq!(turns[1].user_input.as_deref(), Some("Hello"));
        assert!(reconciler.visible_suggestions().is_empty());
        assert!(!reconciler.accepts_input());

        let outcome = reconciler.drive_turn().await.unwrap();

        let TurnOutcome::Finalized(turn) = outcome else {
            panic!("expected finalized turn");
        };
        assert_eq!(turn.id, TurnId::new(77));
        assert_eq!(turn.user_input.as_deref(), Some("Hello"));
        assert_eq!(turn.arcs[0].id, ArcId::new(3));
        assert_eq!(reconciler.conversation().len(), 2);
        assert_eq!(reconciler.conversation().turns()[1], turn);
        assert_eq!(reconciler.live_arc(), None);
        assert_eq!(reconciler.visible_suggestions().actions, vec!["bow".to_string()]);
        assert_eq!(
            backend.requests()[0].user_input.as_deref(),
            Some("Hello")
        );

        let updates = drain(&mut updates);
        let arcs = live_arcs(&updates);
        assert_eq!(arcs.len(), 3);
        assert_eq!(arcs[0].scenario, "Rain on the docks.");
        assert_eq!(arcs[2].dialogs, vec!["Hi".to_string(), "there".to_string()]);
        assert!(matches!(updates.last(), Some(ChatUpdate::SuggestionsChanged(s)) if s.actions == vec!["bow".to_string()]));
    }

    #[tokio::test]
    async fn hello_on_empty_conversation_drafts_then_finalizes() {
        let backend = ScriptedBackend::default().script(Script::Chunks(vec![COMPLETE]));
        let (mut reconciler, _backend) = reconciler(backend);

        reconciler.begin_turn(Some("Hello".to_string())).unwrap();
        let drafts = reconciler
            .conversation()
            .turns()
            .iter()
            .map(|turn| (turn.user_input.clone(), turn.status))
            .collect::<Vec<_>>();
        assert_eq!(drafts, vec![(Some("Hello".to_string()), TurnStatus::Draft)]);

        reconciler.drive_turn().await.unwrap();

        let turns = reconciler.conversation().turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].status, TurnStatus::Finalized);
        assert_eq!(turns[0].user_input.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn empty_session_auto_starts_without_a_draft() {
        let backend = ScriptedBackend::default().script(Script::Chunks(vec![DIALOG_HI, COMPLETE]));
        let (mut reconciler, backend) = reconciler(backend);
        let mut updates = reconciler.subscribe();

        let outcome = reconciler.open().await.unwrap();

        assert!(matches!(outcome, Some(TurnOutcome::Finalized(_))));
        assert_eq!(backend.requests()[0].user_input, None);
        assert_eq!(reconciler.conversation().len(), 1);
        assert_eq!(reconciler.conversation().turns()[0].user_input, None);
        assert!(reconciler.accepts_input());
        assert!(!reconciler.needs_auto_start());
        let updates = drain(&mut updates);
        assert!(
            !updates
                .iter()
                .any(|update| matches!(update, ChatUpdate::DraftAppended(_)))
        );
    }

    #[tokio::test]
    async fn existing_history_does_not_auto_start() {
        let (mut reconciler, backend) = reconciler(ScriptedBackend::with_history(vec![opening_record()]));

        let outcome = reconciler.open().await.unwrap();

        assert_eq!(outcome, None);
        assert!(backend.requests().is_empty());
        assert_eq!(reconciler.visible_suggestions().len(), 2);
    }

    #[tokio::test]
    async fn stream_failure_rolls_back_the_draft() {
        let backend = ScriptedBackend::with_history(vec![opening_record()])
            .script(Script::ChunksThenError(vec![SCENARIO, DIALOG_HI], "connection reset"));
        let (mut reconciler, _backend) = reconciler(backend);
        reconciler.load_history().await.unwrap();
        let before = reconciler.conversation().turns().to_vec();

        let error = reconciler
            .send_turn(Some("Hello".to_string()))
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "stream read failed: connection reset");
        assert_eq!(reconciler.conversation().turns(), before.as_slice());
        assert_eq!(reconciler.error(), Some("stream read failed: connection reset"));
        assert_eq!(reconciler.live_arc(), None);
        assert!(reconciler.accepts_input());

        reconciler.dismiss_error();
        assert_eq!(reconciler.error(), None);
    }

    #[tokio::test]
    async fn stream_without_complete_is_a_failure() {
        let backend = ScriptedBackend::with_history(vec![opening_record()])
            .script(Script::Chunks(vec![DIALOG_HI]));
        let (mut reconciler, _backend) = reconciler(backend);
        reconciler.load_history().await.unwrap();

        let error = reconciler
            .send_turn(Some("Hello".to_string()))
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "stream ended before the turn completed");
        assert_eq!(reconciler.conversation().len(), 1);
    }

    #[tokio::test]
    async fn open_error_rolls_back_the_draft() {
        let backend = ScriptedBackend::with_history(vec![opening_record()]).script(Script::OpenError(503));
        let (mut reconciler, _backend) = reconciler(backend);
        reconciler.load_history().await.unwrap();

        let error = reconciler
            .send_turn(Some("Hello".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(error, ChatError::OpenStream { .. }));
        assert_eq!(reconciler.conversation().len(), 1);
        assert_eq!(reconciler.error(), Some("HTTP error! status: 503"));
    }

    #[tokio::test]
    async fn failed_auto_start_is_not_retried() {
        let backend = ScriptedBackend::default().script(Script::Chunks(vec![SCENARIO]));
        let (mut reconciler, backend) = reconciler(backend);

        assert!(reconciler.open().await.is_err());

        assert!(reconciler.conversation().is_empty());
        assert!(!reconciler.needs_auto_start());
        assert_eq!(backend.requests().len(), 1);

        reconciler.load_history().await.unwrap();
        assert!(reconciler.needs_auto_start());
    }

    #[tokio::test]
    async fn events_after_complete_are_ignored() {
        let chunk = "data: {\"type\":\"complete\",\"content\":{\"item_id\":5,\"arcs\":[{\"arc_id\":1,\"scenario\":\"Fog.\",\"dialogs\":[]}]}}\ndata: {\"type\":\"dialog\",\"content\":\"late\"}\n";
        let backend = ScriptedBackend::default().script(Script::Chunks(vec![chunk]));
        let (mut reconciler, _backend) = reconciler(backend);
        let mut updates = reconciler.subscribe();

        reconciler.send_turn(None).await.unwrap();

        assert!(live_arcs(&drain(&mut updates)).is_empty());
        assert_eq!(reconciler.conversation().turns()[0].arcs[0].dialogs, Vec::<String>::new());
    }

    #[tokio::test]
    async fn transport_error_after_complete_keeps_the_turn() {
        let backend = ScriptedBackend::with_history(vec![opening_record()])
            .script(Script::ChunksThenError(vec![COMPLETE], "connection reset"));
        let (mut reconciler, _backend) = reconciler(backend);
        reconciler.load_history().await.unwrap();

        let outcome = reconciler.send_turn(Some("Hello".to_string())).await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Finalized(_)));
        assert_eq!(reconciler.conversation().len(), 2);
        assert_eq!(reconciler.conversation().turns()[1].id, TurnId::new(77));
        assert_eq!(reconciler.error(), None);
        assert!(reconciler.accepts_input());
    }

    #[tokio::test]
    async fn malformed_frames_do_not_stop_the_turn() {
        let backend = ScriptedBackend::default()
            .script(Script::Chunks(vec!["data: {broken\n", SCENARIO, "data: also broken\n", COMPLETE]));
        let (mut reconciler, _backend) = reconciler(backend);
        let mut updates = reconciler.subscribe();

        let outcome = reconciler.send_turn(None).await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Finalized(_)));
        assert_eq!(live_arcs(&drain(&mut updates))[0].scenario, "Rain on the docks.");
    }

    #[tokio::test]
    async fn latest_scenario_replaces_earlier_one() {
        let second = "data: {\"type\":\"scenario\",\"content\":\"Thunder.\"}\n";
        let backend = ScriptedBackend::default().script(Script::Chunks(vec![SCENARIO, DIALOG_HI, second, COMPLETE]));
        let (mut reconciler, _backend) = reconciler(backend);
        let mut updates = reconciler.subscribe();

        reconciler.send_turn(None).await.unwrap();

        let arcs = live_arcs(&drain(&mut updates));
        let last = arcs.last().unwrap();
        assert_eq!(last.scenario, "Thunder.");
        assert_eq!(last.dialogs, vec!["Hi".to_string()]);
    }

    #[tokio::test]
    async fn second_send_is_skipped_while_streaming() {
        let backend = ScriptedBackend::with_history(vec![opening_record()]).script(Script::Pending);
        let (mut reconciler, backend) = reconciler(backend);
        reconciler.load_history().await.unwrap();

        assert!(reconciler.begin_turn(Some("first".to_string())).unwrap());
        let outcome = reconciler.send_turn(Some("second".to_string())).await.unwrap();

        assert_eq!(outcome, TurnOutcome::Skipped);
        assert_eq!(backend.requests().len(), 1);
        assert_eq!(reconciler.conversation().len(), 2);
    }

    #[tokio::test]
    async fn blank_input_is_skipped() {
        let (mut reconciler, backend) = reconciler(ScriptedBackend::with_history(vec![opening_record()]));
        reconciler.load_history().await.unwrap();

        let outcome = reconciler.send_turn(Some(" \n\t".to_string())).await.unwrap();

        assert_eq!(outcome, TurnOutcome::Skipped);
        assert!(backend.requests().is_empty());
        assert_eq!(reconciler.conversation().len(), 1);
    }

    #[tokio::test]
    async fn abandon_removes_the_draft_and_ignores_late_events() {
        let backend = ScriptedBackend::with_history(vec![opening_record()]).script(Script::Pending);
        let (mut reconciler, _backend) = reconciler(backend);
        reconciler.load_history().await.unwrap();
        let before = reconciler.conversation().turns().to_vec();
        reconciler.begin_turn(Some("Hello".to_string())).unwrap();
        let abandoned = StreamTarget::new(session(), StreamId::new(1));

        assert!(reconciler.abandon());
        assert!(!reconciler.abandon());

        assert_eq!(reconciler.conversation().turns(), before.as_slice());
        assert_eq!(reconciler.error(), None);
        let late = reconciler.apply_event(TurnStreamEvent {
            target: abandoned,
            payload: TurnStreamPayload::Dialog("late".to_string()),
        });
        assert!(late.is_none());
        assert_eq!(reconciler.live_arc(), None);
    }

    #[tokio::test]
    async fn stale_events_do_not_touch_the_live_arc() {
        let backend = ScriptedBackend::with_history(vec![opening_record()]).script(Script::Pending);
        let (mut reconciler, _backend) = reconciler(backend);
        reconciler.load_history().await.unwrap();
        reconciler.begin_turn(Some("Hello".to_string())).unwrap();

        let stale = reconciler.apply_event(TurnStreamEvent {
            target: StreamTarget::new(session(), StreamId::new(99)),
            payload: TurnStreamPayload::Dialog("from elsewhere".to_string()),
        });
        let current = reconciler.apply_event(TurnStreamEvent {
            target: StreamTarget::new(session(), StreamId::new(1)),
            payload: TurnStreamPayload::Dialog("mine".to_string()),
        });

        assert!(stale.is_none());
        assert!(current.is_none());
        assert_eq!(
            reconciler.live_arc().map(|arc| arc.dialogs.clone()),
            Some(vec!["mine".to_string()])
        );
    }

    #[tokio::test]
    async fn action_suggestion_is_sent_wrapped() {
        let backend = ScriptedBackend::with_history(vec![opening_record()])
            .script(Script::Chunks(vec![COMPLETE]));
        let (mut reconciler, backend) = reconciler(backend);
        reconciler.load_history().await.unwrap();
        let suggestion = reconciler.visible_suggestions().get(0).unwrap();

        reconciler.send_suggestion(&suggestion).await.unwrap();

        assert_eq!(
            backend.requests()[0].user_input.as_deref(),
            Some("*look around*")
        );
    }

    #[tokio::test]
    async fn history_failure_is_reported() {
        let backend = ScriptedBackend {
            history_status: Some(500),
            ..ScriptedBackend::default()
        };
        let (mut reconciler, _backend) = reconciler(backend);

        let error = reconciler.load_history().await.unwrap_err();

        assert!(matches!(error, ChatError::History { .. }));
        assert!(error.to_string().ends_with("HTTP error! status: 500"));
    }

    #[tokio::test]
    async fn history_reload_is_refused_while_streaming() {
        let backend = ScriptedBackend::with_history(vec![opening_record()]).script(Script::Pending);
        let (mut reconciler, _backend) = reconciler(backend);
        reconciler.load_history().await.unwrap();
        reconciler.begin_turn(Some("Hello".to_string())).unwrap();

        let error = reconciler.load_history().await.unwrap_err();

        assert!(matches!(error, ChatError::Busy { .. }));
        assert_eq!(reconciler.conversation().len(), 2);
    }
}
