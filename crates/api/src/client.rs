use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot};

use crate::backend::{BoxFuture, ChatBackend, TurnRequest};
use crate::credential::BearerToken;
use crate::endpoints::Endpoints;
use crate::error::{
    ApiResult, BuildHttpClientSnafu, DecodeBodySnafu, HttpStatusSnafu, RequestSnafu,
};
use crate::ids::{CharacterId, SessionId};
use crate::stream::{
    StreamTarget, TurnStreamEvent, TurnStreamHandle, TurnWorker, emit_error_event,
    forward_chunks, make_event_stream,
};
use crate::types::{
    CharacterRecord, ChatTurnBody, CreatedCharacter, CreatedSession, NewCharacter, NewSession,
    SessionRecord, TurnRecord,
};

const ACCEPT_JSON: &str = "application/json";

/// Authenticated client for the FinTalk REST and streaming endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    token: BearerToken,
}

impl BackendClient {
    pub fn new(endpoints: Endpoints, token: BearerToken) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context(BuildHttpClientSnafu {
                stage: "build-backend-client",
            })?;

        Ok(Self {
            http,
            endpoints,
            token,
        })
    }

    pub async fn list_characters(&self) -> ApiResult<Vec<CharacterRecord>> {
        self.get_json("list-characters", self.endpoints.characters_list())
            .await
    }

    pub async fn create_character(&self, input: NewCharacter) -> ApiResult<CharacterId> {
        let input = input.normalized()?;
        let created: CreatedCharacter = self
            .post_json("create-character", self.endpoints.characters_create(), &input)
            .await?;
        Ok(created.character_id)
    }

    pub async fn list_sessions(&self) -> ApiResult<Vec<SessionRecord>> {
        self.get_json("list-sessions", self.endpoints.sessions_list())
            .await
    }

    pub async fn create_session(&self, input: NewSession) -> ApiResult<SessionId> {
        let input = input.normalized()?;
        let created: CreatedSession = self
            .post_json("create-session", self.endpoints.sessions_create(), &input)
            .await?;
        Ok(created.session_id)
    }

    /// Most recent turns of a session, newest first.
    pub async fn query_turns(
        &self,
        session_id: &SessionId,
        limit: Option<usize>,
    ) -> ApiResult<Vec<TurnRecord>> {
        self.get_json("query-turns", self.endpoints.session_query(session_id, limit))
            .await
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        authorize(builder, &self.token)
    }

    async fn get_json<T>(&self, stage: &'static str, url: String) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .context(RequestSnafu { stage })?;
        decode_json(stage, response).await
    }

    async fn post_json<B, T>(&self, stage: &'static str, url: String, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .authorized(self.http.post(url))
            .json(body)
            .send()
            .await
            .context(RequestSnafu { stage })?;
        decode_json(stage, response).await
    }

    async fn run_turn_worker(
        http: reqwest::Client,
        url: String,
        token: BearerToken,
        body: ChatTurnBody,
        target: StreamTarget,
        event_tx: mpsc::UnboundedSender<TurnStreamEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let request = authorize(http.post(url), &token).json(&body).send();

        let response = tokio::select! {
            biased;
            _ = &mut cancel_rx => {
                tracing::debug!(
                    session_id = %target.session_id,
                    stream_id = target.stream_id.0,
                    "turn stream cancelled before response headers"
                );
                return;
            }
            response = request => response,
        };

        let response = match check_status("open-turn-stream", response) {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    session_id = %target.session_id,
                    stream_id = target.stream_id.0,
                    stage = error.stage(),
                    error = %error,
                    "failed to open turn stream"
                );
                emit_error_event(&event_tx, &target, error.to_string());
                return;
            }
        };

        let outcome =
            forward_chunks(response.bytes_stream(), &target, &event_tx, &mut cancel_rx).await;
        tracing::debug!(
            session_id = %target.session_id,
            stream_id = target.stream_id.0,
            outcome = ?outcome,
            "turn stream worker finished"
        );
    }
}

impl ChatBackend for BackendClient {
    fn fetch_history<'a>(
        &'a self,
        session_id: &'a SessionId,
        limit: Option<usize>,
    ) -> BoxFuture<'a, ApiResult<Vec<TurnRecord>>> {
        Box::pin(self.query_turns(session_id, limit))
    }

    fn stream_turn(&self, request: TurnRequest) -> ApiResult<TurnStreamHandle> {
        let url = self.endpoints.session_chat(request.session_id());
        let body = request.body();
        tracing::debug!(
            session_id = %request.target.session_id,
            stream_id = request.target.stream_id.0,
            auto_start = body.user_input.is_none(),
            "opening turn stream"
        );

        let (event_tx, stream, cancel_rx) = make_event_stream(request.target.clone());
        let worker: TurnWorker = Box::pin(Self::run_turn_worker(
            self.http.clone(),
            url,
            self.token.clone(),
            body,
            request.target,
            event_tx,
            cancel_rx,
        ));

        Ok(TurnStreamHandle { stream, worker })
    }
}

fn authorize(builder: RequestBuilder, token: &BearerToken) -> RequestBuilder {
    builder
        .header(ACCEPT, ACCEPT_JSON)
        .bearer_auth(token.expose())
}

fn check_status(
    stage: &'static str,
    response: Result<Response, reqwest::Error>,
) -> ApiResult<Response> {
    let response = response.context(RequestSnafu { stage })?;
    let status = response.status();
    if !status.is_success() {
        return HttpStatusSnafu {
            stage,
            status: status.as_u16(),
        }
        .fail();
    }
    Ok(response)
}

async fn decode_json<T>(stage: &'static str, response: Response) -> ApiResult<T>
where
    T: DeserializeOwned,
{
    let response = check_status(stage, Ok(response))?;
    response
        .json::<T>()
        .await
        .context(DecodeBodySnafu { stage })
}
