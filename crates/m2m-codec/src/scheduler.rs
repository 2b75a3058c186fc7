// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! One-job-at-a-time scheduler
//!
//! The hardware behind an [`M2mDevice`] runs a single job at a time. Contexts
//! ask to be scheduled once they have work on both queues; the device runs
//! them in arrival order. Finishing a job hands the device to the next
//! pending context, if any.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Identity of a codec context on its device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

#[derive(Debug, Default)]
struct SchedState {
    next_id: u32,
    registered: Vec<ContextId>,
    running: Option<ContextId>,
    pending: VecDeque<ContextId>,
}

/// Memory-to-memory device shared by every context of a codec
#[derive(Debug, Default)]
pub struct M2mDevice {
    state: Mutex<SchedState>,
}

impl M2mDevice {
    pub fn new() -> Arc<M2mDevice> {
        Arc::new(M2mDevice::default())
    }

    fn lock(&self) -> MutexGuard<'_, SchedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new context
    pub fn register(&self) -> ContextId {
        let mut state = self.lock();
        let id = ContextId(state.next_id);
        state.next_id = state.next_id.wrapping_add(1);
        state.registered.push(id);
        log::trace!("registered {}", id);
        id
    }

    /// Drop a context: cancels any pending job. A running job must be
    /// finished through [`M2mDevice::job_finish`] first.
    pub fn release(&self, id: ContextId) {
        let mut state = self.lock();
        state.registered.retain(|&c| c != id);
        state.pending.retain(|&c| c != id);
        if state.running == Some(id) {
            log::warn!("{} released with a job still running", id);
            state.running = None;
        }
    }

    /// Ask for `id` to run. Returns true when the device was idle and `id`
    /// now owns it; the caller runs the job immediately. Otherwise the
    /// context is queued behind the running job.
    pub fn try_schedule(&self, id: ContextId) -> bool {
        let mut state = self.lock();
        if !state.registered.contains(&id) {
            log::warn!("scheduling unknown {}", id);
            return false;
        }
        if state.running == Some(id) || state.pending.contains(&id) {
            return false;
        }
        if state.running.is_none() {
            state.running = Some(id);
            return true;
        }
        state.pending.push_back(id);
        false
    }

    /// Finish the job of `id`. Returns the next context to run, already
    /// marked running.
    pub fn job_finish(&self, id: ContextId) -> Option<ContextId> {
        let mut state = self.lock();
        if state.running != Some(id) {
            log::warn!("{} finished a job it was not running", id);
            return None;
        }
        state.running = state.pending.pop_front();
        state.running
    }

    /// Remove a pending job of `id`
    pub fn cancel(&self, id: ContextId) {
        self.lock().pending.retain(|&c| c != id);
    }

    pub fn is_running(&self, id: ContextId) -> bool {
        self.lock().running == Some(id)
    }

    pub fn is_pending(&self, id: ContextId) -> bool {
        self.lock().pending.contains(&id)
    }

    /// Context currently owning the hardware
    pub fn running(&self) -> Option<ContextId> {
        self.lock().running
    }
}
