use fintalk_api::ApiError;
use snafu::Snafu;

use crate::settings::SettingsError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("not logged in; run `fintalk login` first"))]
    NotLoggedIn { stage: &'static str },
    #[snafu(display("request failed on `{stage}`: {source}"))]
    Api {
        stage: &'static str,
        source: ApiError,
    },
    #[snafu(display("{source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("character {id} not found"))]
    CharacterNotFound { stage: &'static str, id: String },
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;
