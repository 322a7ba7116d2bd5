use std::fmt;

use dashboard_core::{AnalysisOutcome, MediaBlob, Ticket, TrafficForecast};
use serde::Serialize;

/// Completions reported back to the session. Each echoes the ticket of the
/// command that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SampleFetched {
        ticket: Ticket,
        result: Result<MediaBlob, ClientError>,
    },
    Submitted {
        ticket: Ticket,
        result: Result<AnalysisOutcome, ClientError>,
    },
    ArtifactFetched {
        ticket: Ticket,
        result: Result<MediaBlob, ClientError>,
    },
    TrafficPredicted {
        ticket: Ticket,
        result: Result<TrafficForecast, ClientError>,
    },
    ChatChunk {
        ticket: Ticket,
        text: String,
    },
    ChatFinished {
        ticket: Ticket,
        result: Result<(), ClientError>,
    },
}

impl EngineEvent {
    pub fn ticket(&self) -> Ticket {
        match self {
            EngineEvent::SampleFetched { ticket, .. }
            | EngineEvent::Submitted { ticket, .. }
            | EngineEvent::ArtifactFetched { ticket, .. }
            | EngineEvent::TrafficPredicted { ticket, .. }
            | EngineEvent::ChatChunk { ticket, .. }
            | EngineEvent::ChatFinished { ticket, .. } => *ticket,
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(rename = "stationId")]
    pub station_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClientError {
    pub kind: FailureKind,
    pub message: String,
}

impl ClientError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Decode, message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidEndpoint,
    /// The sample behind a deferred payload could not be materialized.
    SampleFetch,
    Transport { status: Option<u16> },
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    /// The chat body broke off after the response started.
    Stream,
    Decode,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidEndpoint => write!(f, "invalid endpoint"),
            FailureKind::SampleFetch => write!(f, "sample fetch failed"),
            FailureKind::Transport { status: Some(code) } => write!(f, "http status {code}"),
            FailureKind::Transport { status: None } => write!(f, "network error"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Stream => write!(f, "stream interrupted"),
            FailureKind::Decode => write!(f, "malformed response"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Reasons the engine thread could not be started.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to build async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("failed to build http client: {0}")]
    Client(#[from] ClientError),
}
