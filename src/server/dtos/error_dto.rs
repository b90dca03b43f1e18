use serde::Serialize;

/// `{error, message}` body for every pre-stream failure on the relay endpoints
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MissingParameterBody {
    pub error: String,
}
