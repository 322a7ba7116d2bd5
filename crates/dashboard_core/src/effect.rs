use crate::media::MediaBlob;
use crate::result::ResponseShape;
use crate::traffic::TrafficQuery;
use crate::Ticket;

/// Work the platform must perform on behalf of the state machine. Every
/// effect carries the ticket its completion message must echo back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Materialize a sample for preview.
    FetchSample { ticket: Ticket, locator: String },
    /// Send a single multipart request to a prediction endpoint.
    Submit {
        ticket: Ticket,
        endpoint: &'static str,
        shape: ResponseShape,
        payload: Payload,
    },
    /// Second stage of a derived-artifact result.
    FetchArtifact {
        ticket: Ticket,
        endpoint: &'static str,
        identifier: String,
    },
    PredictTraffic { ticket: Ticket, query: TrafficQuery },
    OpenChatStream {
        ticket: Ticket,
        message: String,
        station_id: String,
    },
    CancelChatStream { ticket: Ticket },
}

impl Effect {
    pub fn ticket(&self) -> Ticket {
        match self {
            Effect::FetchSample { ticket, .. }
            | Effect::Submit { ticket, .. }
            | Effect::FetchArtifact { ticket, .. }
            | Effect::PredictTraffic { ticket, .. }
            | Effect::OpenChatStream { ticket, .. }
            | Effect::CancelChatStream { ticket } => *ticket,
        }
    }
}

/// Body of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bytes already in hand.
    Ready { blob: MediaBlob, file_name: String },
    /// A sample that still has to be fetched before the endpoint is contacted.
    Sample { locator: String },
}
