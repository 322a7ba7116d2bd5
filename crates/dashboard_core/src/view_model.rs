use crate::chat::ChatMessage;
use crate::input::InputSource;
use crate::result::{AnalysisOutcome, Prediction, RequestState};
use crate::slot::{AnalysisSlot, ArtifactState, SlotId};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStatus {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

impl<T> From<&RequestState<T>> for RequestStatus {
    fn from(state: &RequestState<T>) -> Self {
        match state {
            RequestState::Idle => RequestStatus::Idle,
            RequestState::Submitting => RequestStatus::Submitting,
            RequestState::Succeeded(_) => RequestStatus::Succeeded,
            RequestState::Failed(_) => RequestStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArtifactView {
    #[default]
    Hidden,
    Loading,
    Ready { url: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    pub slot: SlotId,
    pub input_label: Option<String>,
    pub using_sample: bool,
    pub preview_url: Option<String>,
    pub status: RequestStatus,
    pub can_submit: bool,
    pub prediction_label: Option<String>,
    pub probability_lines: Vec<String>,
    pub message: Option<String>,
    pub detail_lines: Vec<String>,
    pub artifact: ArtifactView,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrafficView {
    pub station_input: String,
    pub datetime_input: String,
    pub status: RequestStatus,
    pub can_submit: bool,
    pub prediction: Option<String>,
    pub error: Option<String>,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatView {
    pub station_id: Option<String>,
    pub input: String,
    pub messages: Vec<ChatMessage>,
    pub is_streaming: bool,
    pub can_submit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub slots: Vec<SlotView>,
    pub traffic: TrafficView,
    pub chat: ChatView,
    pub live_previews: usize,
    pub dirty: bool,
}

impl AppViewModel {
    pub(crate) fn build(state: &AppState) -> Self {
        let traffic = state.traffic();
        let chat = state.chat();
        Self {
            slots: state.slots().iter().map(slot_view).collect(),
            traffic: TrafficView {
                station_input: traffic.station_input().to_string(),
                datetime_input: traffic.datetime_input().to_string(),
                status: traffic.request().into(),
                can_submit: traffic.can_submit(),
                prediction: traffic.request().result().map(|forecast| {
                    format!(
                        "Station {} at {}: {} vehicles",
                        forecast.station_id, forecast.datetime, forecast.predicted_volume
                    )
                }),
                error: traffic.request().failure().map(ToString::to_string),
                notice: traffic.notice().map(ToOwned::to_owned),
            },
            chat: ChatView {
                station_id: chat.station_id().map(ToOwned::to_owned),
                input: chat.input().to_string(),
                messages: chat.messages().to_vec(),
                is_streaming: chat.is_streaming(),
                can_submit: chat.can_submit(),
            },
            live_previews: state.registry().live_count(),
            dirty: state.is_dirty(),
        }
    }

    pub fn slot(&self, id: SlotId) -> Option<&SlotView> {
        self.slots.iter().find(|view| view.slot == id)
    }
}

fn slot_view(slot: &AnalysisSlot) -> SlotView {
    let outcome = slot.request().result();
    let prediction = outcome.and_then(AnalysisOutcome::prediction);
    SlotView {
        slot: slot.id(),
        input_label: slot.input().map(|input| input.display_name().to_string()),
        using_sample: slot.input().is_some_and(InputSource::is_sample),
        preview_url: slot.preview().map(|handle| handle.url()),
        status: slot.request().into(),
        can_submit: slot.can_submit(),
        prediction_label: prediction.map(|p| p.label.clone()),
        probability_lines: prediction.map(format_probabilities).unwrap_or_default(),
        message: match outcome {
            Some(AnalysisOutcome::Derived(derived)) => Some(derived.message.clone()),
            _ => None,
        },
        detail_lines: prediction.map(detail_lines).unwrap_or_default(),
        artifact: match slot.artifact() {
            ArtifactState::None => ArtifactView::Hidden,
            ArtifactState::Pending => ArtifactView::Loading,
            ArtifactState::Ready(handle) => ArtifactView::Ready { url: handle.url() },
            ArtifactState::Failed(failure) => ArtifactView::Failed {
                error: failure.to_string(),
            },
        },
        error: slot.request().failure().map(ToString::to_string),
        notice: slot.notice().map(ToOwned::to_owned),
        samples: slot
            .id()
            .spec()
            .samples
            .iter()
            .map(|locator| locator.to_string())
            .collect(),
    }
}

/// `"<label>: <fraction * 100 with two decimals>%"`.
pub fn format_probability(label: &str, fraction: f64) -> String {
    format!("{label}: {:.2}%", fraction * 100.0)
}

pub fn format_probabilities(prediction: &Prediction) -> Vec<String> {
    prediction
        .class_probabilities
        .iter()
        .map(|(label, fraction)| format_probability(label, *fraction))
        .collect()
}

fn detail_lines(prediction: &Prediction) -> Vec<String> {
    let Some(details) = prediction.details.as_ref() else {
        return Vec::new();
    };
    let mut lines = Vec::new();
    if let Some(score) = details.confidence_score {
        lines.push(format!("Confidence: {:.2}%", score * 100.0));
    }
    lines.extend(
        details
            .events
            .iter()
            .map(|event| format!("{} at {}", event.kind, event.timestamp)),
    );
    if let Some(recommendations) = &details.recommendations {
        lines.push(format!("Recommendations: {recommendations}"));
    }
    lines
}
