// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Buffer queues
//!
//! Each context has two [`VideoQueue`]s: OUTPUT, filled by the application
//! and consumed by the codec, and CAPTURE, filled by the codec and returned
//! to the application. Which one carries coded data depends on the codec
//! type.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use unix_ts::Timestamp;

use crate::ctrls::MediaRequest;
use crate::format::{BufType, Field};
use crate::scheduler::ContextId;

/// Most buffers a queue may hold
pub const MAX_BUFFERS: u32 = 32;

/// Frame is a keyframe
pub const BUF_FLAG_KEYFRAME: u32 = 0x0000_0008;
/// Frame is a predicted frame
pub const BUF_FLAG_PFRAME: u32 = 0x0000_0010;
/// Frame is a bidirectionally predicted frame
pub const BUF_FLAG_BFRAME: u32 = 0x0000_0020;
/// Flags carried from a source buffer onto its destination
pub const BUF_FLAGS_FRAME_TYPE: u32 = BUF_FLAG_KEYFRAME | BUF_FLAG_PFRAME | BUF_FLAG_BFRAME;

/// Where a buffer is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Owned by the application
    Dequeued,
    /// Waiting for a job
    Queued,
    /// Processed successfully
    Done,
    /// Processing failed or the stream was stopped
    Error,
}

impl BufferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BufferState::Done | BufferState::Error)
    }
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BufferState::Dequeued => "dequeued",
            BufferState::Queued => "queued",
            BufferState::Done => "done",
            BufferState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One memory plane of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Plane {
    /// Allocated size
    pub length: u32,
    /// Bytes holding payload
    pub bytesused: u32,
}

/// A video buffer and its metadata
#[derive(Debug, Clone)]
pub struct VideoBuffer {
    index: u32,
    buf_type: BufType,
    owner: ContextId,
    pub planes: Vec<Plane>,
    pub field: Field,
    pub timestamp: Timestamp,
    pub sequence: u32,
    pub flags: u32,
    state: BufferState,
    request: Option<Arc<MediaRequest>>,
}

impl VideoBuffer {
    pub(crate) fn new(index: u32, buf_type: BufType, owner: ContextId, planes: Vec<Plane>) -> Self {
        VideoBuffer {
            index,
            buf_type,
            owner,
            planes,
            field: Field::Any,
            timestamp: Timestamp::new(0, 0),
            sequence: 0,
            flags: 0,
            state: BufferState::Dequeued,
            request: None,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn buf_type(&self) -> BufType {
        self.buf_type
    }

    /// Context whose queue the buffer belongs to
    pub fn owner(&self) -> ContextId {
        self.owner
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn request(&self) -> Option<&Arc<MediaRequest>> {
        self.request.as_ref()
    }

    /// Total payload across planes
    pub fn bytesused(&self) -> u64 {
        self.planes.iter().map(|p| p.bytesused as u64).sum()
    }

    pub(crate) fn set_state(&mut self, state: BufferState) {
        self.state = state;
    }

    pub(crate) fn set_request(&mut self, request: Option<Arc<MediaRequest>>) {
        self.request = request;
    }

    pub(crate) fn take_request(&mut self) -> Option<Arc<MediaRequest>> {
        self.request.take()
    }

    /// Carry per-frame metadata from a source buffer: timestamp, field and
    /// the frame type flags.
    pub fn copy_metadata(&mut self, src: &VideoBuffer) {
        self.timestamp = src.timestamp;
        self.field = src.field;
        self.flags = (self.flags & !BUF_FLAGS_FRAME_TYPE) | (src.flags & BUF_FLAGS_FRAME_TYPE);
    }
}

/// Queue parameters chosen by the codec at context creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub buf_type: BufType,
    /// Buffers may be queued through media requests
    pub supports_requests: bool,
    /// Destination timestamps are copied from the source
    pub timestamp_copy: bool,
    /// Smallest number of buffers allocated by `reqbufs`
    pub min_buffers: u32,
}

impl QueueConfig {
    pub fn new(buf_type: BufType) -> QueueConfig {
        QueueConfig {
            buf_type,
            supports_requests: false,
            timestamp_copy: true,
            min_buffers: 1,
        }
    }
}

/// A buffer queue of one context
#[derive(Debug)]
pub struct VideoQueue {
    config: QueueConfig,
    num_buffers: u32,
    streaming: bool,
    requires_requests: bool,
    pub(crate) ready: VecDeque<VideoBuffer>,
    pub(crate) done: VecDeque<VideoBuffer>,
}

impl VideoQueue {
    pub(crate) fn new(config: QueueConfig) -> VideoQueue {
        VideoQueue {
            config,
            num_buffers: 0,
            streaming: false,
            requires_requests: false,
            ready: VecDeque::new(),
            done: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn buf_type(&self) -> BufType {
        self.config.buf_type
    }

    /// A queue is busy once buffers are allocated; its format is then fixed
    pub fn is_busy(&self) -> bool {
        self.num_buffers > 0
    }

    pub fn num_buffers(&self) -> u32 {
        self.num_buffers
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Every buffer must arrive through a media request
    pub fn requires_requests(&self) -> bool {
        self.requires_requests
    }

    /// Buffers waiting for a job
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Finished buffers waiting to be dequeued
    pub fn done_count(&self) -> usize {
        self.done.len()
    }

    /// Next buffer a job would consume
    pub fn next_ready(&self) -> Option<&VideoBuffer> {
        self.ready.front()
    }

    pub(crate) fn next_ready_mut(&mut self) -> Option<&mut VideoBuffer> {
        self.ready.front_mut()
    }

    pub(crate) fn set_num_buffers(&mut self, n: u32) {
        self.num_buffers = n;
    }

    pub(crate) fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    pub(crate) fn set_requires_requests(&mut self, requires: bool) {
        self.requires_requests = requires;
    }

    /// Move a buffer to the done list in a terminal state
    pub(crate) fn complete(&mut self, mut buf: VideoBuffer, state: BufferState) {
        buf.set_state(state);
        self.done.push_back(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Direction;

    #[test]
    fn test_copy_metadata() {
        let ctx = ContextId(0);
        let mut src = VideoBuffer::new(0, BufType::VideoOutput, ctx, vec![Plane::default()]);
        src.timestamp = Timestamp::new(12, 500);
        src.field = Field::None;
        src.flags = BUF_FLAG_KEYFRAME | 0x4000;

        let mut dst = VideoBuffer::new(3, BufType::VideoCapture, ctx, vec![Plane::default()]);
        dst.flags = BUF_FLAG_PFRAME | 0x1;
        dst.copy_metadata(&src);

        assert_eq!(dst.timestamp, Timestamp::new(12, 500));
        assert_eq!(dst.field, Field::None);
        assert_eq!(dst.flags, BUF_FLAG_KEYFRAME | 0x1);
        assert_eq!(dst.index(), 3);
    }

    #[test]
    fn test_busy() {
        let mut q = VideoQueue::new(QueueConfig::new(BufType::new(Direction::Capture, true)));
        assert!(!q.is_busy());
        q.set_num_buffers(4);
        assert!(q.is_busy());
        assert_eq!(q.buf_type(), BufType::VideoCaptureMplane);
    }
}
