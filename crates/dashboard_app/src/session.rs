use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::Result;
use dashboard_core::{
    update, AppState, AppViewModel, ArtifactState, Effect, MediaBlob, Msg, Page, SlotId, Ticket,
};
use dashboard_engine::{EngineEvent, EngineHandle};
use dashboard_logging::dash_debug;

use crate::config::DashboardConfig;
use crate::effects::{msg_for, EffectRunner};

/// One running dashboard: owns the state, runs its effects, and feeds
/// completions back in. Dropping the session tears every page down.
pub struct Session {
    state: AppState,
    runner: EffectRunner,
    in_flight: HashSet<Ticket>,
}

impl Session {
    pub fn start(config: &DashboardConfig) -> Result<Self> {
        let engine = EngineHandle::new(config.client_settings())?;
        Ok(Self::with_engine(engine))
    }

    pub fn with_engine(engine: EngineHandle) -> Self {
        Self {
            state: AppState::new(),
            runner: EffectRunner::new(engine),
            in_flight: HashSet::new(),
        }
    }

    /// Apply a message; returns whether the view changed.
    pub fn dispatch(&mut self, msg: Msg) -> bool {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        self.run(effects);
        self.state.consume_dirty()
    }

    /// Drain completions that are already available without blocking.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Some(event) = self.runner.try_next() {
            changed |= self.apply(event);
        }
        changed
    }

    /// Block for at most `timeout` on the next completion.
    pub fn wait_for_event(&mut self, timeout: Duration) -> Option<bool> {
        let event = self.runner.next_within(timeout)?;
        Some(self.apply(event))
    }

    /// Process completions until nothing is in flight. Returns `false` if
    /// `timeout` elapses first.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.in_flight.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            if self.wait_for_event(remaining).is_none() {
                return false;
            }
        }
        true
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn view(&self) -> AppViewModel {
        self.state.view()
    }

    /// Bytes behind the slot's current input preview.
    pub fn preview_media(&self, slot: SlotId) -> Option<&MediaBlob> {
        let handle = self.state.slot(slot).preview()?;
        self.state.registry().get(handle)
    }

    /// Bytes behind the slot's loaded artifact.
    pub fn artifact_media(&self, slot: SlotId) -> Option<&MediaBlob> {
        match self.state.slot(slot).artifact() {
            ArtifactState::Ready(handle) => self.state.registry().get(*handle),
            _ => None,
        }
    }

    pub fn close_page(&mut self, page: Page) -> bool {
        self.dispatch(Msg::PageClosed(page))
    }

    fn apply(&mut self, event: EngineEvent) -> bool {
        if !matches!(event, EngineEvent::ChatChunk { .. }) {
            self.in_flight.remove(&event.ticket());
        }
        self.dispatch(msg_for(event))
    }

    fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match &effect {
                Effect::CancelChatStream { ticket } => {
                    self.in_flight.remove(ticket);
                }
                other => {
                    self.in_flight.insert(other.ticket());
                }
            }
            self.runner.run(effect);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let effects = self.state.teardown_all();
        dash_debug!(
            "Session closing with {} request(s) in flight",
            self.in_flight.len()
        );
        self.run(effects);
    }
}
