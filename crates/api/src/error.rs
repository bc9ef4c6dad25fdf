use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("api id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
    #[snafu(display("bearer token is empty"))]
    EmptyToken { stage: &'static str },
    #[snafu(display("{details}"))]
    Validation {
        stage: &'static str,
        details: &'static str,
    },
    #[snafu(display("failed to build http client on `{stage}`, {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request failed on `{stage}`, {source}"))]
    Request {
        stage: &'static str,
        source: reqwest::Error,
    },
    // Error bodies are never parsed; callers only see the status code.
    #[snafu(display("HTTP error! status: {status}"))]
    HttpStatus { stage: &'static str, status: u16 },
    #[snafu(display("failed to decode response body on `{stage}`, {source}"))]
    DecodeBody {
        stage: &'static str,
        source: reqwest::Error,
    },
}

impl ApiError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidId { stage, .. }
            | Self::EmptyToken { stage }
            | Self::Validation { stage, .. }
            | Self::BuildHttpClient { stage, .. }
            | Self::Request { stage, .. }
            | Self::HttpStatus { stage, .. }
            | Self::DecodeBody { stage, .. } => stage,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
