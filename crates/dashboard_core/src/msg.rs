use crate::media::MediaBlob;
use crate::result::{AnalysisOutcome, Failure, TrafficForecast};
use crate::slot::{Page, SlotId};
use crate::Ticket;

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User picked a file for a media slot.
    FileSelected {
        slot: SlotId,
        file_name: String,
        declared_type: Option<String>,
        bytes: Vec<u8>,
    },
    /// User picked one of the slot's sample assets.
    SampleSelected { slot: SlotId, locator: String },
    /// User clicked the slot's analyze button.
    SubmitClicked { slot: SlotId },
    /// The page unmounted; its slots release everything they hold.
    PageClosed(Page),

    /// Engine materialized a sample for preview.
    SampleLoaded { ticket: Ticket, blob: MediaBlob },
    SampleFailed { ticket: Ticket, failure: Failure },
    /// Engine parsed a first-stage response.
    SubmissionSucceeded {
        ticket: Ticket,
        outcome: AnalysisOutcome,
    },
    SubmissionFailed { ticket: Ticket, failure: Failure },
    /// Engine fetched a second-stage artifact.
    ArtifactLoaded { ticket: Ticket, blob: MediaBlob },
    ArtifactFailed { ticket: Ticket, failure: Failure },

    TrafficStationChanged(String),
    TrafficDateTimeChanged(String),
    TrafficSubmitted,
    TrafficSucceeded {
        ticket: Ticket,
        forecast: TrafficForecast,
    },
    TrafficFailed { ticket: Ticket, failure: Failure },

    ChatInputChanged(String),
    ChatStationSelected(String),
    ChatSubmitted,
    /// Next decoded piece of the assistant reply, in arrival order.
    ChatChunk { ticket: Ticket, text: String },
    ChatStreamEnded { ticket: Ticket },
    ChatStreamFailed { ticket: Ticket, failure: Failure },
}
