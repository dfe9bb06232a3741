/// Why an inbound frame could not be turned into an [`InboundMessage`].
///
/// Every variant is recoverable: the frame is dropped and the connection
/// stays open.
///
/// [`InboundMessage`]: crate::messages::InboundMessage
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("range sample is missing its pose field `{0}`")]
    MissingPose(&'static str),
}

impl DecodeError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "invalid_json",
            Self::NotAnObject(_) => "not_an_object",
            Self::Malformed { .. } => "malformed",
            Self::MissingPose(_) => "missing_pose",
        }
    }
}
