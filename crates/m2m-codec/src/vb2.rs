// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Queue and buffer lifecycle
//!
//! The helpers a buffer engine calls back into (setup, validate, prepare,
//! queue, cleanup, start and stop) together with the small engine surface
//! applications use: `reqbufs`, `create_bufs`, `qbuf`, `dqbuf`, `streamon`
//! and `streamoff`.

use crate::context::CodecContext;
use crate::format::{Direction, Field, PixFormat};
use crate::queue::{BufferState, Plane, VideoBuffer, MAX_BUFFERS};
use crate::Error;

impl CodecContext {
    fn fmt_for(&self, dir: Direction) -> &PixFormat {
        if self.is_coded_queue(dir) {
            &self.coded_fmt
        } else {
            &self.decoded_fmt
        }
    }

    /// Plane sizes for buffers of the `dir` queue.
    ///
    /// With `requested` the caller's plane count and sizes are checked
    /// against the negotiated format; without it the format's own sizes are
    /// returned.
    pub fn queue_setup(&self, dir: Direction, requested: Option<&[u32]>) -> Result<Vec<u32>, Error> {
        let f = self.fmt_for(dir);
        let expected: Vec<u32> = (0..f.plane_count()).map(|i| f.plane_size(i)).collect();

        let Some(sizes) = requested.filter(|s| !s.is_empty()) else {
            return Ok(expected);
        };

        if sizes.len() != expected.len() {
            return Err(Error::InvalidArgument(format!(
                "{} planes requested, format {} has {}",
                sizes.len(),
                f.pixelformat,
                expected.len()
            )));
        }
        for (i, (&size, &needed)) in sizes.iter().zip(&expected).enumerate() {
            if size < needed {
                return Err(Error::InvalidArgument(format!(
                    "plane {} size {} below {}",
                    i, size, needed
                )));
            }
        }
        Ok(sizes.to_vec())
    }

    /// Coded and raw video are always progressive here
    pub fn buf_out_validate(&self, buf: &mut VideoBuffer) {
        buf.field = Field::None;
    }

    /// Reject a buffer too small for the negotiated format
    pub fn buf_prepare(&self, buf: &VideoBuffer) -> Result<(), Error> {
        let f = self.fmt_for(buf.buf_type().direction());
        for i in 0..f.plane_count() {
            let length = buf.planes.get(i).map_or(0, |p| p.length);
            if length < f.plane_size(i) {
                return Err(Error::InvalidArgument(format!(
                    "buffer {} plane {} holds {} bytes, {} needed",
                    buf.index(),
                    i,
                    length,
                    f.plane_size(i)
                )));
            }
        }
        Ok(())
    }

    /// Hand a prepared buffer to the ready list of its queue
    pub(crate) fn buf_queue(&mut self, mut buf: VideoBuffer) {
        buf.set_state(BufferState::Queued);
        log::trace!("{}: queued {} buffer {}", self.id, buf.buf_type(), buf.index());
        self.queue_mut(buf.buf_type().direction()).ready.push_back(buf);
    }

    /// Complete the control state of the request a buffer belongs to
    pub fn buf_request_complete(&self, buf: &VideoBuffer) {
        if let Some(req) = buf.request() {
            self.ctrl_hdl.request_complete(req);
        }
    }

    /// Return every buffer waiting on the `dir` queue with `state`,
    /// completing their requests.
    pub fn queue_cleanup(&mut self, dir: Direction, state: BufferState) {
        let state = if state.is_terminal() {
            state
        } else {
            log::error!("{}: queue cleanup with non-terminal state {}", self.id, state);
            BufferState::Error
        };

        let mut drained = 0;
        while let Some(buf) = self.queue_mut(dir).ready.pop_front() {
            self.buf_request_complete(&buf);
            self.queue_mut(dir).complete(buf, state);
            drained += 1;
        }
        if drained > 0 {
            log::debug!("{}: returned {} {} buffers as {}", self.id, drained, dir, state);
        }
    }

    /// Start hook of the coded queue: runs the active format's `start`
    pub fn start_streaming(&mut self, dir: Direction, count: u32) -> Result<(), Error> {
        if !self.is_coded_queue(dir) {
            return Ok(());
        }

        let codec = self.codec.clone();
        let Some(desc) = self.coded_desc.and_then(|i| codec.caps().coded_fmts().get(i)) else {
            log::error!("{}: start streaming without a coded format", self.id);
            return Err(Error::InvalidArgument("no coded format resolved".into()));
        };
        log::debug!("{}: starting {} with {} buffers", self.id, desc.fourcc, count);
        desc.ops()?.start(self)
    }

    /// Stop hook: runs the active format's `stop` on the coded queue then
    /// returns the queue's pending buffers in the error state.
    pub fn stop_streaming(&mut self, dir: Direction) {
        if self.is_coded_queue(dir) {
            let codec = self.codec.clone();
            match self.coded_desc.and_then(|i| codec.caps().coded_fmts().get(i)) {
                Some(desc) => {
                    if let Ok(ops) = desc.ops() {
                        ops.stop(self);
                    }
                }
                None => log::error!("{}: stop streaming without a coded format", self.id),
            }
        }

        self.queue_cleanup(dir, BufferState::Error);
    }

    /// Allocate `count` buffers on the `dir` queue, or free them with 0.
    ///
    /// Buffers are returned to the caller, which hands them back through
    /// [`CodecContext::qbuf`] or a media request.
    pub fn reqbufs(&mut self, dir: Direction, count: u32) -> Result<Vec<VideoBuffer>, Error> {
        let q = self.queue(dir);
        let buf_type = q.buf_type();

        if count == 0 {
            if q.is_streaming() || q.ready_count() > 0 {
                return Err(Error::Busy(buf_type));
            }
            let q = self.queue_mut(dir);
            q.set_num_buffers(0);
            q.done.clear();
            log::debug!("{}: freed {} buffers", self.id, buf_type);
            return Ok(Vec::new());
        }

        if q.is_busy() {
            return Err(Error::Busy(buf_type));
        }

        let count = count.max(q.config().min_buffers).min(MAX_BUFFERS);
        let sizes = self.queue_setup(dir, None)?;
        self.queue_mut(dir).set_num_buffers(count);
        log::debug!("{}: allocated {} {} buffers of {:?}", self.id, count, buf_type, sizes);

        Ok(self.make_buffers(dir, 0..count, &sizes))
    }

    /// Append up to `count` buffers with caller chosen plane sizes
    pub fn create_bufs(&mut self, dir: Direction, count: u32, sizes: &[u32]) -> Result<Vec<VideoBuffer>, Error> {
        let sizes = self.queue_setup(dir, Some(sizes))?;
        let first = self.queue(dir).num_buffers();
        if first >= MAX_BUFFERS {
            return Err(Error::ResourceExhausted(format!(
                "{} queue already holds {} buffers",
                dir, first
            )));
        }

        let last = first.saturating_add(count).min(MAX_BUFFERS);
        self.queue_mut(dir).set_num_buffers(last);
        Ok(self.make_buffers(dir, first..last, &sizes))
    }

    fn make_buffers(&self, dir: Direction, indices: std::ops::Range<u32>, sizes: &[u32]) -> Vec<VideoBuffer> {
        let buf_type = self.queue(dir).buf_type();
        indices
            .map(|index| {
                let planes = sizes
                    .iter()
                    .map(|&length| Plane {
                        length,
                        bytesused: 0,
                    })
                    .collect();
                VideoBuffer::new(index, buf_type, self.id, planes)
            })
            .collect()
    }

    pub(crate) fn check_buffer(&self, buf: &VideoBuffer) -> Result<(), Error> {
        let q = self.queue(buf.buf_type().direction());
        if buf.owner() != self.id {
            return Err(Error::InvalidArgument(format!(
                "buffer {} belongs to {}",
                buf.index(),
                buf.owner()
            )));
        }
        if buf.buf_type() != q.buf_type() {
            return Err(Error::InvalidArgument(format!(
                "{} buffer on {} queue",
                buf.buf_type(),
                q.buf_type()
            )));
        }
        if buf.index() >= q.num_buffers() {
            return Err(Error::InvalidArgument(format!(
                "buffer index {} not allocated",
                buf.index()
            )));
        }
        if buf.state() == BufferState::Queued {
            return Err(Error::InvalidArgument(format!(
                "buffer {} already queued",
                buf.index()
            )));
        }
        Ok(())
    }

    /// Validate, prepare and queue a buffer
    pub(crate) fn submit_buffer(&mut self, mut buf: VideoBuffer) -> Result<(), Error> {
        self.check_buffer(&buf)?;
        if buf.buf_type().is_output() {
            self.buf_out_validate(&mut buf);
        }
        self.buf_prepare(&buf)?;
        self.buf_queue(buf);
        Ok(())
    }

    /// Queue a buffer outside of any request.
    ///
    /// An OUTPUT queue whose coded format needs requests refuses it.
    pub fn qbuf(&mut self, mut buf: VideoBuffer) -> Result<(), Error> {
        let dir = buf.buf_type().direction();
        if dir == Direction::Output && self.queue(dir).requires_requests() {
            return Err(Error::InvalidArgument(format!(
                "{} buffers must be queued through a request",
                buf.buf_type()
            )));
        }
        buf.set_request(None);
        self.submit_buffer(buf)
    }

    /// Take the oldest finished buffer off the `dir` queue
    pub fn dqbuf(&mut self, dir: Direction) -> Result<VideoBuffer, Error> {
        self.queue_mut(dir)
            .done
            .pop_front()
            .ok_or_else(|| Error::NotFound(format!("no finished {} buffer", dir)))
    }

    /// Start streaming on the `dir` queue
    pub fn streamon(&mut self, dir: Direction) -> Result<(), Error> {
        let q = self.queue(dir);
        if q.is_streaming() {
            return Ok(());
        }
        if !q.is_busy() {
            return Err(Error::InvalidArgument(format!("no {} buffers allocated", dir)));
        }

        let count = q.ready_count() as u32;
        self.start_streaming(dir, count)?;
        self.queue_mut(dir).set_streaming(true);
        log::info!("{}: {} stream on", self.id, dir);
        Ok(())
    }

    /// Stop streaming on the `dir` queue. Waiting buffers come back in the
    /// error state and any pending job of this context is cancelled.
    pub fn streamoff(&mut self, dir: Direction) -> Result<(), Error> {
        let device = self.codec.device().clone();
        device.cancel(self.id);
        if device.is_running(self.id) {
            log::warn!("{}: {} stream off while a job is running", self.id, dir);
        }

        if self.queue(dir).is_streaming() {
            self.stop_streaming(dir);
            self.queue_mut(dir).set_streaming(false);
            log::info!("{}: {} stream off", self.id, dir);
        }
        Ok(())
    }
}
