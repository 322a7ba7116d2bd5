//! Bookkeeping for transient preview handles.
//!
//! Every preview the dashboard shows is backed by an entry here. Each
//! [`PreviewOwner`] holds at most one live handle; releasing an entry drops
//! the bytes backing it.

use std::collections::BTreeMap;

use dashboard_logging::{dash_debug, dash_warn};

use crate::media::MediaBlob;
use crate::slot::SlotId;

/// Opaque, revocable reference to a previewable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreviewHandle(u64);

impl PreviewHandle {
    pub fn id(self) -> u64 {
        self.0
    }

    /// Renderer-facing locator for this handle.
    pub fn url(self) -> String {
        format!("blob:dashboard/{}", self.0)
    }
}

/// Logical preview slot a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PreviewOwner {
    /// Preview of the selected input.
    Input(SlotId),
    /// Derived artifact returned by a two-stage result.
    Artifact(SlotId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    owner: PreviewOwner,
    media: MediaBlob,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreviewRegistry {
    next_id: u64,
    live: BTreeMap<PreviewHandle, Entry>,
    acquired: u64,
    released: u64,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `media` for `owner`. A handle the owner still holds is
    /// released first so the owner never has two live handles.
    pub fn acquire(&mut self, owner: PreviewOwner, media: MediaBlob) -> PreviewHandle {
        if let Some(stale) = self.handle_for(owner) {
            dash_warn!("Preview owner {:?} still held {:?}; releasing it", owner, stale);
            self.release(stale);
        }
        self.next_id += 1;
        let handle = PreviewHandle(self.next_id);
        self.live.insert(handle, Entry { owner, media });
        self.acquired += 1;
        handle
    }

    /// Release a handle. Unknown or already released handles are ignored.
    pub fn release(&mut self, handle: PreviewHandle) -> bool {
        match self.live.remove(&handle) {
            Some(entry) => {
                self.released += 1;
                dash_debug!("Released preview {:?} owned by {:?}", handle, entry.owner);
                true
            }
            None => {
                dash_debug!("Ignoring release of unknown preview {:?}", handle);
                false
            }
        }
    }

    /// Release `old` (if any) and acquire a new handle in one step.
    pub fn replace(
        &mut self,
        old: Option<PreviewHandle>,
        owner: PreviewOwner,
        media: MediaBlob,
    ) -> PreviewHandle {
        if let Some(old) = old {
            self.release(old);
        }
        self.acquire(owner, media)
    }

    /// Release whatever `owner` currently holds.
    pub fn release_owner(&mut self, owner: PreviewOwner) -> bool {
        match self.handle_for(owner) {
            Some(handle) => self.release(handle),
            None => false,
        }
    }

    pub fn get(&self, handle: PreviewHandle) -> Option<&MediaBlob> {
        self.live.get(&handle).map(|entry| &entry.media)
    }

    pub fn handle_for(&self, owner: PreviewOwner) -> Option<PreviewHandle> {
        self.live
            .iter()
            .find(|(_, entry)| entry.owner == owner)
            .map(|(handle, _)| *handle)
    }

    pub fn is_live(&self, handle: PreviewHandle) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn acquired_total(&self) -> u64 {
        self.acquired
    }

    pub fn released_total(&self) -> u64 {
        self.released
    }
}
