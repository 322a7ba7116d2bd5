//! Per-slot submission and result reconciliation.
//!
//! A slot owns one input, one preview and one request lifecycle. Every
//! asynchronous operation it starts is tagged with a [`Ticket`]; completions
//! whose ticket the slot no longer waits on are stale and ignored.

use dashboard_logging::{dash_debug, dash_info, dash_warn};

use crate::effect::{Effect, Payload};
use crate::input::InputSource;
use crate::media::{MediaBlob, MediaKind};
use crate::registry::{PreviewHandle, PreviewOwner, PreviewRegistry};
use crate::result::{AnalysisOutcome, Failure, RequestState, ResponseShape};
use crate::state::TicketSeq;
use crate::Ticket;

/// Feature page of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    AccidentDetection,
    DriverAlertness,
    TrafficPrediction,
    StationChat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotId {
    AccidentImage,
    AccidentVideo,
    Drowsiness,
}

/// Static configuration of a media slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSpec {
    pub endpoint: &'static str,
    pub shape: ResponseShape,
    pub accepts: MediaKind,
    pub samples: &'static [&'static str],
    /// Path prefix for second-stage artifacts; the identifier is appended.
    pub artifact_endpoint: Option<&'static str>,
}

const ACCIDENT_SAMPLES: &[&str] = &[
    "/accident_prediction/accident1.webp",
    "/accident_prediction/accident3.jpg",
];

const DROWSINESS_SAMPLES: &[&str] = &[
    "/drowsiness/drowsiness1.jpg",
    "/drowsiness/drowsiness2.png",
    "/drowsiness/drowsiness3.png",
];

impl SlotId {
    pub const ALL: [SlotId; 3] = [SlotId::AccidentImage, SlotId::AccidentVideo, SlotId::Drowsiness];

    pub fn spec(self) -> SlotSpec {
        match self {
            SlotId::AccidentImage => SlotSpec {
                endpoint: "/api/accident/predict/image",
                shape: ResponseShape::Prediction,
                accepts: MediaKind::Image,
                samples: ACCIDENT_SAMPLES,
                artifact_endpoint: None,
            },
            SlotId::AccidentVideo => SlotSpec {
                endpoint: "/api/accident/predict/video",
                shape: ResponseShape::DerivedArtifact,
                accepts: MediaKind::Video,
                samples: &[],
                artifact_endpoint: Some("/api/accident/frames"),
            },
            SlotId::Drowsiness => SlotSpec {
                endpoint: "/api/drowsiness/predict",
                shape: ResponseShape::Prediction,
                accepts: MediaKind::Image,
                samples: DROWSINESS_SAMPLES,
                artifact_endpoint: None,
            },
        }
    }

    /// Position in [`SlotId::ALL`].
    pub fn index(self) -> usize {
        match self {
            SlotId::AccidentImage => 0,
            SlotId::AccidentVideo => 1,
            SlotId::Drowsiness => 2,
        }
    }

    pub fn page(self) -> Page {
        match self {
            SlotId::AccidentImage | SlotId::AccidentVideo => Page::AccidentDetection,
            SlotId::Drowsiness => Page::DriverAlertness,
        }
    }
}

/// Sub-state of a succeeded two-stage result.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ArtifactState {
    #[default]
    None,
    Pending,
    Ready(PreviewHandle),
    Failed(Failure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSlot {
    id: SlotId,
    input: Option<InputSource>,
    input_version: u64,
    preview: Option<PreviewHandle>,
    request: RequestState<AnalysisOutcome>,
    artifact: ArtifactState,
    notice: Option<String>,
    sample_fetch: Option<Ticket>,
    submission: Option<Ticket>,
    artifact_fetch: Option<Ticket>,
}

impl AnalysisSlot {
    pub fn new(id: SlotId) -> Self {
        Self {
            id,
            input: None,
            input_version: 0,
            preview: None,
            request: RequestState::Idle,
            artifact: ArtifactState::None,
            notice: None,
            sample_fetch: None,
            submission: None,
            artifact_fetch: None,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn input(&self) -> Option<&InputSource> {
        self.input.as_ref()
    }

    /// Bumped on every input change and teardown.
    pub fn input_version(&self) -> u64 {
        self.input_version
    }

    pub fn preview(&self) -> Option<PreviewHandle> {
        self.preview
    }

    pub fn request(&self) -> &RequestState<AnalysisOutcome> {
        &self.request
    }

    pub fn artifact(&self) -> &ArtifactState {
        &self.artifact
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Whether the submit trigger is enabled.
    pub fn can_submit(&self) -> bool {
        self.input.is_some() && !self.request.is_submitting()
    }

    pub(crate) fn awaits(&self, ticket: Ticket) -> bool {
        [self.sample_fetch, self.submission, self.artifact_fetch].contains(&Some(ticket))
    }

    pub(crate) fn select_file(
        &mut self,
        registry: &mut PreviewRegistry,
        file_name: String,
        declared_type: Option<String>,
        bytes: Vec<u8>,
    ) {
        let source = InputSource::file(bytes, file_name, declared_type.as_deref());
        let accepts = self.id.spec().accepts;
        let Some(blob) = source.resolved().cloned() else {
            return;
        };
        if !accepts.matches(blob.content_type()) {
            dash_warn!(
                "Rejected {} for {:?}: content type {} is not {}",
                source.display_name(),
                self.id,
                blob.content_type(),
                accepts.noun()
            );
            self.notice = Some(format!("Please select a valid {} file.", accepts.noun()));
            return;
        }

        self.invalidate(registry);
        self.preview = Some(registry.replace(self.preview, PreviewOwner::Input(self.id), blob));
        dash_info!(
            "{:?} input set to file {} (version {})",
            self.id,
            source.display_name(),
            self.input_version
        );
        self.input = Some(source);
    }

    pub(crate) fn select_sample(
        &mut self,
        registry: &mut PreviewRegistry,
        tickets: &mut TicketSeq,
        locator: String,
    ) -> Option<Effect> {
        if !self.id.spec().samples.contains(&locator.as_str()) {
            dash_warn!("Rejected sample {} for {:?}: not offered by this slot", locator, self.id);
            self.notice = Some(format!(
                "Please select a valid {} sample.",
                self.id.spec().accepts.noun()
            ));
            return None;
        }
        self.invalidate(registry);
        let ticket = tickets.next();
        self.sample_fetch = Some(ticket);
        self.input = Some(InputSource::sample(locator.clone()));
        dash_info!(
            "{:?} input set to sample {} (version {})",
            self.id,
            locator,
            self.input_version
        );
        Some(Effect::FetchSample { ticket, locator })
    }

    pub(crate) fn sample_loaded(
        &mut self,
        registry: &mut PreviewRegistry,
        ticket: Ticket,
        blob: MediaBlob,
    ) -> bool {
        if self.sample_fetch != Some(ticket) {
            return false;
        }
        self.sample_fetch = None;
        if let Some(InputSource::Sample { materialized, .. }) = self.input.as_mut() {
            *materialized = Some(blob.clone());
        }
        self.preview = Some(registry.replace(self.preview, PreviewOwner::Input(self.id), blob));
        true
    }

    pub(crate) fn sample_failed(&mut self, ticket: Ticket, failure: Failure) -> bool {
        if self.sample_fetch != Some(ticket) {
            return false;
        }
        self.sample_fetch = None;
        dash_warn!("{:?} sample preview failed: {}", self.id, failure);
        // A submission already in flight fetches the sample itself.
        if !self.request.is_submitting() {
            self.request = RequestState::Failed(failure);
        }
        true
    }

    pub(crate) fn submit(&mut self, registry: &mut PreviewRegistry, tickets: &mut TicketSeq) -> Option<Effect> {
        let Some(input) = self.input.as_ref() else {
            dash_warn!("{:?} submit ignored: no input selected", self.id);
            self.notice = Some("Select a file or a sample first.".to_string());
            return None;
        };
        if self.request.is_submitting() {
            dash_warn!("{:?} submit ignored: request already in flight", self.id);
            return None;
        }

        let payload = match input {
            InputSource::Sample {
                locator,
                materialized: None,
            } => Payload::Sample {
                locator: locator.clone(),
            },
            resolved => match resolved.resolved() {
                Some(blob) => Payload::Ready {
                    blob: blob.clone(),
                    file_name: resolved.display_name().to_string(),
                },
                None => return None,
            },
        };

        self.release_artifact(registry);
        self.notice = None;
        self.request = RequestState::Submitting;
        let ticket = tickets.next();
        self.submission = Some(ticket);
        let spec = self.id.spec();
        dash_info!(
            "{:?} submitting to {} (ticket {}, version {})",
            self.id,
            spec.endpoint,
            ticket,
            self.input_version
        );
        Some(Effect::Submit {
            ticket,
            endpoint: spec.endpoint,
            shape: spec.shape,
            payload,
        })
    }

    /// Applies a first-stage result; returns `None` if the ticket is stale,
    /// `Some(effects)` otherwise.
    pub(crate) fn submission_succeeded(
        &mut self,
        tickets: &mut TicketSeq,
        ticket: Ticket,
        outcome: AnalysisOutcome,
    ) -> Option<Vec<Effect>> {
        if self.submission != Some(ticket) {
            return None;
        }
        self.submission = None;

        let spec = self.id.spec();
        if outcome.shape() != spec.shape {
            dash_warn!(
                "{:?} received {:?} but expects {:?}",
                self.id,
                outcome.shape(),
                spec.shape
            );
            self.request = RequestState::Failed(Failure::Decode {
                message: "response shape does not match endpoint".to_string(),
            });
            return Some(Vec::new());
        }

        let mut effects = Vec::new();
        if let AnalysisOutcome::Derived(derived) = &outcome {
            match (&derived.artifact, spec.artifact_endpoint) {
                (Some(artifact), Some(endpoint)) => {
                    let artifact_ticket = tickets.next();
                    self.artifact_fetch = Some(artifact_ticket);
                    self.artifact = ArtifactState::Pending;
                    effects.push(Effect::FetchArtifact {
                        ticket: artifact_ticket,
                        endpoint,
                        identifier: artifact.identifier.clone(),
                    });
                }
                _ => self.artifact = ArtifactState::None,
            }
        }
        self.request = RequestState::Succeeded(outcome);
        Some(effects)
    }

    pub(crate) fn submission_failed(&mut self, ticket: Ticket, failure: Failure) -> bool {
        if self.submission != Some(ticket) {
            return false;
        }
        self.submission = None;
        dash_warn!("{:?} submission failed: {}", self.id, failure);
        self.request = RequestState::Failed(failure);
        true
    }

    pub(crate) fn artifact_loaded(
        &mut self,
        registry: &mut PreviewRegistry,
        ticket: Ticket,
        blob: MediaBlob,
    ) -> bool {
        if self.artifact_fetch != Some(ticket) {
            return false;
        }
        self.artifact_fetch = None;
        let handle = registry.acquire(PreviewOwner::Artifact(self.id), blob);
        self.artifact = ArtifactState::Ready(handle);
        true
    }

    pub(crate) fn artifact_failed(&mut self, ticket: Ticket, failure: Failure) -> bool {
        if self.artifact_fetch != Some(ticket) {
            return false;
        }
        self.artifact_fetch = None;
        dash_warn!("{:?} artifact fetch failed: {}", self.id, failure);
        self.artifact = ArtifactState::Failed(failure);
        true
    }

    /// Release every handle and forget the input, as on page unmount.
    pub(crate) fn teardown(&mut self, registry: &mut PreviewRegistry) {
        self.invalidate(registry);
        if let Some(preview) = self.preview.take() {
            registry.release(preview);
        }
        self.input = None;
        self.notice = None;
        dash_debug!("{:?} torn down at version {}", self.id, self.input_version);
    }

    /// Input changed: drop results and every in-flight ticket.
    fn invalidate(&mut self, registry: &mut PreviewRegistry) {
        self.input_version += 1;
        self.sample_fetch = None;
        self.submission = None;
        self.request = RequestState::Idle;
        self.notice = None;
        self.release_artifact(registry);
    }

    fn release_artifact(&mut self, registry: &mut PreviewRegistry) {
        self.artifact_fetch = None;
        if let ArtifactState::Ready(handle) = self.artifact {
            registry.release(handle);
        }
        self.artifact = ArtifactState::None;
    }
}
