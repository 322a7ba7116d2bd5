use dashboard_logging::dash_debug;

use crate::chat::Conversation;
use crate::effect::Effect;
use crate::media::MediaBlob;
use crate::registry::PreviewRegistry;
use crate::result::{AnalysisOutcome, Failure};
use crate::slot::{AnalysisSlot, Page, SlotId};
use crate::traffic::TrafficSlot;
use crate::view_model::AppViewModel;

/// Identifies one asynchronous operation. Unique for the life of an [`AppState`].
pub type Ticket = u64;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct TicketSeq(Ticket);

impl TicketSeq {
    pub(crate) fn next(&mut self) -> Ticket {
        self.0 += 1;
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    slots: [AnalysisSlot; SlotId::ALL.len()],
    registry: PreviewRegistry,
    traffic: TrafficSlot,
    chat: Conversation,
    tickets: TicketSeq,
    dirty: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            slots: SlotId::ALL.map(AnalysisSlot::new),
            registry: PreviewRegistry::new(),
            traffic: TrafficSlot::default(),
            chat: Conversation::new(),
            tickets: TicketSeq::default(),
            dirty: false,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel::build(self)
    }

    pub fn slot(&self, id: SlotId) -> &AnalysisSlot {
        &self.slots[id.index()]
    }

    pub fn slots(&self) -> &[AnalysisSlot] {
        &self.slots
    }

    pub fn registry(&self) -> &PreviewRegistry {
        &self.registry
    }

    pub fn traffic(&self) -> &TrafficSlot {
        &self.traffic
    }

    pub fn chat(&self) -> &Conversation {
        &self.chat
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Release every preview and invalidate every operation, as on shutdown.
    pub fn teardown_all(&mut self) -> Vec<Effect> {
        [
            Page::AccidentDetection,
            Page::DriverAlertness,
            Page::TrafficPrediction,
            Page::StationChat,
        ]
        .into_iter()
        .flat_map(|page| self.close_page(page))
        .collect()
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn select_file(
        &mut self,
        id: SlotId,
        file_name: String,
        declared_type: Option<String>,
        bytes: Vec<u8>,
    ) {
        self.slots[id.index()].select_file(&mut self.registry, file_name, declared_type, bytes);
        self.mark_dirty();
    }

    pub(crate) fn select_sample(&mut self, id: SlotId, locator: String) -> Vec<Effect> {
        let effects = self.slots[id.index()]
            .select_sample(&mut self.registry, &mut self.tickets, locator)
            .into_iter()
            .collect();
        self.mark_dirty();
        effects
    }

    pub(crate) fn submit(&mut self, id: SlotId) -> Vec<Effect> {
        let effects = self.slots[id.index()]
            .submit(&mut self.registry, &mut self.tickets)
            .into_iter()
            .collect();
        self.mark_dirty();
        effects
    }

    pub(crate) fn sample_loaded(&mut self, ticket: Ticket, blob: MediaBlob) {
        let Self {
            slots, registry, ..
        } = self;
        let applied = slots
            .iter_mut()
            .any(|slot| slot.sample_loaded(registry, ticket, blob.clone()));
        self.finish_completion("SampleLoaded", ticket, applied);
    }

    pub(crate) fn sample_failed(&mut self, ticket: Ticket, failure: Failure) {
        let applied = self
            .slots
            .iter_mut()
            .any(|slot| slot.sample_failed(ticket, failure.clone()));
        self.finish_completion("SampleFailed", ticket, applied);
    }

    pub(crate) fn submission_succeeded(
        &mut self,
        ticket: Ticket,
        outcome: AnalysisOutcome,
    ) -> Vec<Effect> {
        let Self { slots, tickets, .. } = self;
        let effects = slots
            .iter_mut()
            .find(|slot| slot.awaits(ticket))
            .and_then(|slot| slot.submission_succeeded(tickets, ticket, outcome));
        self.finish_completion("SubmissionSucceeded", ticket, effects.is_some());
        effects.unwrap_or_default()
    }

    pub(crate) fn submission_failed(&mut self, ticket: Ticket, failure: Failure) {
        let applied = self
            .slots
            .iter_mut()
            .any(|slot| slot.submission_failed(ticket, failure.clone()));
        self.finish_completion("SubmissionFailed", ticket, applied);
    }

    pub(crate) fn artifact_loaded(&mut self, ticket: Ticket, blob: MediaBlob) {
        let Self {
            slots, registry, ..
        } = self;
        let applied = slots
            .iter_mut()
            .any(|slot| slot.artifact_loaded(registry, ticket, blob.clone()));
        self.finish_completion("ArtifactLoaded", ticket, applied);
    }

    pub(crate) fn artifact_failed(&mut self, ticket: Ticket, failure: Failure) {
        let applied = self
            .slots
            .iter_mut()
            .any(|slot| slot.artifact_failed(ticket, failure.clone()));
        self.finish_completion("ArtifactFailed", ticket, applied);
    }

    pub(crate) fn traffic_mut(&mut self) -> (&mut TrafficSlot, &mut TicketSeq) {
        (&mut self.traffic, &mut self.tickets)
    }

    pub(crate) fn chat_mut(&mut self) -> (&mut Conversation, &mut TicketSeq) {
        (&mut self.chat, &mut self.tickets)
    }

    /// Record the outcome of a completion message; stale ones leave state untouched.
    pub(crate) fn finish_completion(&mut self, kind: &str, ticket: Ticket, applied: bool) {
        if applied {
            self.mark_dirty();
        } else {
            dash_debug!("Dropping stale {} for ticket {}", kind, ticket);
        }
    }

    pub(crate) fn close_page(&mut self, page: Page) -> Vec<Effect> {
        let mut effects = Vec::new();
        match page {
            Page::AccidentDetection | Page::DriverAlertness => {
                let Self {
                    slots, registry, ..
                } = self;
                for slot in slots.iter_mut().filter(|slot| slot.id().page() == page) {
                    slot.teardown(registry);
                }
            }
            Page::TrafficPrediction => self.traffic.teardown(),
            Page::StationChat => {
                if let Some(ticket) = self.chat.close() {
                    effects.push(Effect::CancelChatStream { ticket });
                }
            }
        }
        self.mark_dirty();
        effects
    }
}
