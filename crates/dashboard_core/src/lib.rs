//! Dashboard core: pure submission/result state machine and view-model helpers.
mod chat;
mod effect;
mod input;
mod media;
mod msg;
mod registry;
mod result;
mod slot;
mod state;
mod traffic;
mod update;
mod view_model;

pub use chat::{ChatMessage, Conversation, MessageId, Role, StreamAccumulator, CHAT_ERROR_TEXT};
pub use effect::{Effect, Payload};
pub use input::InputSource;
pub use media::{infer_content_type, MediaBlob, MediaKind, OCTET_STREAM};
pub use msg::Msg;
pub use registry::{PreviewHandle, PreviewOwner, PreviewRegistry};
pub use result::{
    AnalysisOutcome, ArtifactRef, DerivedArtifactResult, DetectionEvent, Failure, Prediction,
    PredictionDetails, RequestState, ResponseShape, TrafficForecast,
};
pub use slot::{AnalysisSlot, ArtifactState, Page, SlotId, SlotSpec};
pub use state::{AppState, Ticket};
pub use traffic::{TrafficQuery, TrafficSlot, TRAFFIC_DATETIME_FORMAT};
pub use update::update;
pub use view_model::{
    format_probabilities, format_probability, AppViewModel, ArtifactView, ChatView, RequestStatus,
    SlotView, TrafficView,
};
