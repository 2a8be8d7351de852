use thiserror::Error;

/// Reasons an inbound frame could not be turned into a [`ClientEvent`].
///
/// The relay never reports these to the client; they exist so the
/// transport layer can log why a frame was dropped.
///
/// [`ClientEvent`]: crate::protocol::ClientEvent
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Malformed payload for {event}: {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required field {field} in {event}")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },

    #[error("Invalid {event}: {reason}")]
    Invalid {
        event: &'static str,
        reason: &'static str,
    },
}

impl ProtocolError {
    pub(crate) fn missing(event: &'static str, field: &'static str) -> Self {
        Self::MissingField { event, field }
    }
}
