// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Job runner
//!
//! A job consumes the head buffer of each queue. The scheduler grants the
//! device to a context, [`CodecContext::device_run`] hands the job to the
//! active coded format's `run` hook and the hardware later reports back
//! through [`CodecContext::job_finish`].

use std::sync::Arc;

use crate::context::CodecContext;
use crate::ctrls::MediaRequest;
use crate::format::Direction;
use crate::queue::{BufferState, VideoBuffer};
use crate::scheduler::ContextId;
use crate::Error;

/// Buffers of one hardware invocation
///
/// Created by [`CodecContext::run_preamble`] and consumed by
/// [`CodecContext::run_postamble`], so a run is finished at most once.
#[derive(Debug)]
#[must_use = "a job run must be finished with run_postamble"]
pub struct JobRun {
    src: u32,
    dst: u32,
    request: Option<Arc<MediaRequest>>,
}

impl JobRun {
    /// Index of the source buffer
    pub fn src_index(&self) -> u32 {
        self.src
    }

    /// Index of the destination buffer
    pub fn dst_index(&self) -> u32 {
        self.dst
    }

    /// Request bound to the source buffer
    pub fn request(&self) -> Option<&Arc<MediaRequest>> {
        self.request.as_ref()
    }
}

impl CodecContext {
    /// Prepare a run: look at the next buffer of each queue without taking
    /// them, apply the source request's controls and copy the source
    /// metadata onto the destination.
    pub fn run_preamble(&mut self) -> Result<JobRun, Error> {
        let src = self
            .queue(Direction::Output)
            .next_ready()
            .cloned()
            .ok_or_else(|| Error::NotFound("no source buffer".into()))?;
        let dst = self
            .queue_mut(Direction::Capture)
            .next_ready_mut()
            .ok_or_else(|| Error::NotFound("no destination buffer".into()))?;
        dst.copy_metadata(&src);
        let dst = dst.index();

        let request = src.request().cloned();
        if let Some(req) = &request {
            self.ctrl_hdl.request_setup(req);
        }

        Ok(JobRun {
            src: src.index(),
            dst,
            request,
        })
    }

    /// Finish a run: complete the control state of the source request
    pub fn run_postamble(&mut self, run: JobRun) {
        if let Some(req) = &run.request {
            self.ctrl_hdl.request_complete(req);
        }
    }

    /// Hand the current job to the active coded format.
    ///
    /// The format's `run` hook is expected to start the hardware and return;
    /// completion arrives later through [`CodecContext::job_finish`]. When
    /// it fails the caller finishes the job with [`BufferState::Error`].
    pub fn device_run(&mut self) -> Result<(), Error> {
        let codec = self.codec.clone();
        let Some(desc) = self.coded_desc.and_then(|i| codec.caps().coded_fmts().get(i)) else {
            log::error!("{}: device run without a coded format", self.id);
            return Err(Error::InvalidArgument("no coded format resolved".into()));
        };

        log::trace!("{}: running {}", self.id, desc.fourcc);
        desc.ops()?.run(self)
    }

    /// Both queues stream and hold a buffer
    pub fn job_ready(&self) -> bool {
        [Direction::Output, Direction::Capture].into_iter().all(|dir| {
            let q = self.queue(dir);
            q.is_streaming() && q.ready_count() > 0
        })
    }

    /// Ask the device scheduler for the hardware. Returns true when the
    /// caller should call [`CodecContext::device_run`] right away.
    pub fn try_schedule(&self) -> bool {
        self.job_ready() && self.codec.device().try_schedule(self.id)
    }

    /// Return the head buffer of each queue with `state` and release the
    /// device. Returns the next context the scheduler picked, which the
    /// caller must run.
    ///
    /// The source request is completed here as well, so a job whose run
    /// failed before its postamble still leaves no request queued.
    pub fn job_finish(&mut self, state: BufferState) -> Option<ContextId> {
        let state = if state.is_terminal() {
            state
        } else {
            log::error!("{}: job finished with non-terminal state {}", self.id, state);
            BufferState::Error
        };

        for dir in [Direction::Output, Direction::Capture] {
            match self.queue_mut(dir).ready.pop_front() {
                Some(buf) => {
                    self.buf_request_complete(&buf);
                    self.queue_mut(dir).complete(buf, state);
                }
                None => log::warn!("{}: job finished without a {} buffer", self.id, dir),
            }
        }

        let next = self.codec.device().job_finish(self.id);
        log::trace!("{}: job done ({}), next {:?}", self.id, state, next);
        next
    }

    /// Source and destination buffers of the current job, for the run hook
    pub fn job_buffers_mut(&mut self) -> Option<(&mut VideoBuffer, &mut VideoBuffer)> {
        let src = self.out_q.next_ready_mut()?;
        let dst = self.cap_q.next_ready_mut()?;
        Some((src, dst))
    }
}
