use std::collections::BTreeMap;
use std::fmt;

/// Which payload a prediction endpoint returns. A static property of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseShape {
    Prediction,
    DerivedArtifact,
}

/// Single classification result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Prediction {
    pub label: String,
    /// Per-class fractions in `[0, 1]`; not required to sum to one.
    pub class_probabilities: BTreeMap<String, f64>,
    pub details: Option<PredictionDetails>,
}

/// Optional extras some models attach (drowsiness).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictionDetails {
    pub confidence_score: Option<f64>,
    pub events: Vec<DetectionEvent>,
    pub recommendations: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionEvent {
    pub kind: String,
    pub timestamp: String,
}

/// Artifact named by a first-stage response.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRef {
    pub identifier: String,
    pub prediction: Prediction,
}

/// First-stage result of a two-stage flow. No artifact is a valid terminal answer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DerivedArtifactResult {
    pub message: String,
    pub artifact: Option<ArtifactRef>,
    pub frame_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Prediction(Prediction),
    Derived(DerivedArtifactResult),
}

impl AnalysisOutcome {
    pub fn shape(&self) -> ResponseShape {
        match self {
            AnalysisOutcome::Prediction(_) => ResponseShape::Prediction,
            AnalysisOutcome::Derived(_) => ResponseShape::DerivedArtifact,
        }
    }

    /// The prediction to display, if the outcome carries one.
    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            AnalysisOutcome::Prediction(prediction) => Some(prediction),
            AnalysisOutcome::Derived(derived) => {
                derived.artifact.as_ref().map(|artifact| &artifact.prediction)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficForecast {
    pub station_id: u32,
    pub datetime: String,
    pub predicted_volume: i64,
}

/// User-facing failure taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    SampleFetch { message: String },
    Transport { status: Option<u16>, message: String },
    Stream { message: String },
    Decode { message: String },
}

impl Failure {
    pub fn message(&self) -> &str {
        match self {
            Failure::SampleFetch { message }
            | Failure::Transport { message, .. }
            | Failure::Stream { message }
            | Failure::Decode { message } => message,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::SampleFetch { message } => write!(f, "could not load sample: {message}"),
            Failure::Transport {
                status: Some(status),
                message,
            } => write!(f, "request failed ({status}): {message}"),
            Failure::Transport {
                status: None,
                message,
            } => write!(f, "request failed: {message}"),
            Failure::Stream { message } => write!(f, "stream interrupted: {message}"),
            Failure::Decode { message } => write!(f, "unexpected response: {message}"),
        }
    }
}

/// Lifecycle of one logical operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState<T> {
    Idle,
    Submitting,
    Succeeded(T),
    Failed(Failure),
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        RequestState::Idle
    }
}

impl<T> RequestState<T> {
    pub fn is_submitting(&self) -> bool {
        matches!(self, RequestState::Submitting)
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            RequestState::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            RequestState::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}
