use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::CargoEnv;
use crate::server::dtos::error_dto::{ErrorEnvelope, MissingParameterBody};

pub type AppResult<T> = Result<T, Error>;

/// what the client sees instead of the real message in production
pub const GENERIC_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing {0} parameter")]
    MissingParameter(&'static str),

    #[error("Invalid url parameter: {0}")]
    InvalidParameter(String),

    #[error("link resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(#[from] UpstreamFetchError),

    #[error("unknown upstream provider: {0}")]
    UnknownProvider(String),

    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

/// everything that can go wrong turning a watch page into a media url
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("watch page request failed: {0}")]
    PageFetch(#[source] reqwest::Error),

    #[error("watch page returned {0}")]
    PageStatus(reqwest::StatusCode),

    #[error("watch page redirect failed: {0}")]
    PageRedirect(String),

    #[error("watch page is larger than {0} bytes")]
    PageTooLarge(usize),

    #[error("no embedded file marker found in watch page")]
    MarkerNotFound,

    #[error("embedded file reference is not a valid url: {0}")]
    InvalidMediaUrl(String),

    #[error("embedded file reference has no host: {0}")]
    MissingHost(String),
}

/// failures before any media byte reaches the client
#[derive(Error, Debug)]
pub enum UpstreamFetchError {
    #[error("upstream request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("upstream returned {0}")]
    Status(reqwest::StatusCode),

    #[error("upstream redirect failed: {0}")]
    Redirect(String),

    /// a range was asked for but the answer was not a 206 carrying `Content-Range`
    #[error("upstream ignored the range request and answered {0}")]
    RangeIgnored(reqwest::StatusCode),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingParameter(_) | Error::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Error::Resolution(_)
            | Error::UpstreamFetch(_)
            | Error::UnknownProvider(_)
            | Error::InternalServerErrorWithContext(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// short name used for metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MissingParameter(_) => "missing_parameter",
            Error::InvalidParameter(_) => "invalid_parameter",
            Error::Resolution(ResolutionError::MarkerNotFound) => "marker_not_found",
            Error::Resolution(_) => "resolution",
            Error::UpstreamFetch(_) => "upstream_fetch",
            Error::UnknownProvider(_) => "unknown_provider",
            Error::InternalServerErrorWithContext(_) => "internal",
        }
    }

    /// turns the error into the json envelope the players expect. `label` is the endpoint
    /// specific summary that goes into `error`, the detail only leaves the box outside production
    pub fn into_json_response(self, cargo_env: CargoEnv, label: &str) -> Response {
        let status = self.status_code();

        if let Error::MissingParameter(_) = self {
            return (
                status,
                Json(MissingParameterBody {
                    error: self.to_string(),
                }),
            )
                .into_response();
        }

        let message = if cargo_env.is_production() {
            GENERIC_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        let error = match self {
            Error::InvalidParameter(_) => "Invalid url parameter".to_string(),
            _ => label.to_string(),
        };

        (status, Json(ErrorEnvelope { error, message })).into_response()
    }
}
