// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Out-of-band job completion
//!
//! A format's `run` hook only starts the hardware. Whoever observes the
//! hardware finishing (an interrupt thread, a worker, a timer) reports it
//! through a [`CompletionSender`]. The thread owning the contexts drains the
//! matching [`CompletionReceiver`] and feeds each [`JobCompletion`] to a
//! [`JobDispatcher`], which finishes the job and starts the next one.

use std::collections::BTreeMap;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::context::CodecContext;
use crate::queue::BufferState;
use crate::scheduler::ContextId;

/// Hardware finished the job of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobCompletion {
    pub ctx: ContextId,
    pub state: BufferState,
}

/// Hardware side of the completion channel
#[derive(Debug, Clone)]
pub struct CompletionSender {
    tx: Sender<JobCompletion>,
}

impl CompletionSender {
    /// Report a finished job. Returns false once the receiver is gone.
    pub fn complete(&self, ctx: ContextId, state: BufferState) -> bool {
        match self.tx.send(JobCompletion { ctx, state }) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("{}: completion dropped, receiver closed", ctx);
                false
            }
        }
    }
}

/// Context side of the completion channel
#[derive(Debug)]
pub struct CompletionReceiver {
    rx: Receiver<JobCompletion>,
}

impl CompletionReceiver {
    /// Wait up to `timeout` for a completion. `None` on timeout or when
    /// every sender is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<JobCompletion> {
        match self.rx.recv_timeout(timeout) {
            Ok(done) => Some(done),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<JobCompletion> {
        match self.rx.try_recv() {
            Ok(done) => Some(done),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// Create a completion channel
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (CompletionSender { tx }, CompletionReceiver { rx })
}

/// Owns the contexts of a device and drives their jobs
#[derive(Debug, Default)]
pub struct JobDispatcher {
    contexts: BTreeMap<ContextId, CodecContext>,
}

impl JobDispatcher {
    pub fn new() -> JobDispatcher {
        JobDispatcher::default()
    }

    pub fn insert(&mut self, ctx: CodecContext) -> ContextId {
        let id = ctx.id();
        self.contexts.insert(id, ctx);
        id
    }

    pub fn get(&self, id: ContextId) -> Option<&CodecContext> {
        self.contexts.get(&id)
    }

    pub fn get_mut(&mut self, id: ContextId) -> Option<&mut CodecContext> {
        self.contexts.get_mut(&id)
    }

    pub fn remove(&mut self, id: ContextId) -> Option<CodecContext> {
        self.contexts.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Schedule `id` if it has a job ready, running it when the device is
    /// idle.
    pub fn kick(&mut self, id: ContextId) {
        let scheduled = self.contexts.get(&id).is_some_and(|ctx| ctx.try_schedule());
        if scheduled {
            self.run_from(Some(id));
        }
    }

    /// Finish the job a completion refers to and start whatever runs next
    pub fn complete(&mut self, done: JobCompletion) {
        let Some(ctx) = self.contexts.get_mut(&done.ctx) else {
            log::warn!("{}: completion for a closed context", done.ctx);
            return;
        };

        let next = ctx.job_finish(done.state);
        // Requeue the finished context behind whoever was waiting.
        let again = ctx.try_schedule();
        self.run_from(next);
        if again {
            self.run_from(Some(done.ctx));
        }
    }

    /// Run `next` and, when a run fails to start, finish it in error and
    /// move on to the following context.
    fn run_from(&mut self, mut next: Option<ContextId>) {
        while let Some(id) = next {
            let Some(ctx) = self.contexts.get_mut(&id) else {
                log::warn!("{}: scheduled but closed", id);
                return;
            };

            match ctx.device_run() {
                Ok(()) => return,
                Err(err) => {
                    log::warn!("{}: job failed to start: {}", id, err);
                    next = ctx.job_finish(BufferState::Error);
                    if next.is_none() && ctx.try_schedule() {
                        next = Some(id);
                    }
                }
            }
        }
    }
}
