// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Codec contexts
//!
//! A [`CodecContext`] is the state of one open session on a codec: the two
//! negotiated formats, the active format descriptors, the control registry
//! and both buffer queues. Format negotiation, queue helpers, request
//! validation and the job runner are all implemented as methods on it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::caps::{CodedFormatDesc, DecodedFormatDesc};
use crate::codec::{CodecInstance, CodecType};
use crate::ctrls::ControlHandler;
use crate::format::{BufType, Direction, PixFormat};
use crate::queue::{QueueConfig, VideoQueue};
use crate::scheduler::ContextId;
use crate::Error;

/// Per-session codec state
pub struct CodecContext {
    pub(crate) id: ContextId,
    pub(crate) codec: Arc<CodecInstance>,
    pub(crate) coded_fmt: PixFormat,
    pub(crate) decoded_fmt: PixFormat,
    /// Index into the codec's coded format table
    pub(crate) coded_desc: Option<usize>,
    /// Index into the codec's decoded format table
    pub(crate) decoded_desc: Option<usize>,
    pub(crate) ctrl_hdl: ControlHandler,
    pub(crate) out_q: VideoQueue,
    pub(crate) cap_q: VideoQueue,
    priv_data: Option<Box<dyn Any + Send>>,
    released: bool,
}

impl CodecContext {
    /// Open a session on `codec`.
    ///
    /// Registers every control of every coded format, binds the session to
    /// the device scheduler through the codec's `queue_init` hook, then
    /// resets the coded and decoded formats in that order.
    pub fn new(codec: &Arc<CodecInstance>) -> Result<CodecContext, Error> {
        let caps = codec.caps();
        let ctrl_hdl = init_ctrls(codec)?;

        let mplane = codec.is_multiplanar();
        let mut src = QueueConfig::new(BufType::new(Direction::Output, mplane));
        let mut dst = QueueConfig::new(BufType::new(Direction::Capture, mplane));
        codec.ops().queue_init(&mut src, &mut dst)?;
        check_queue_config(&src, Direction::Output, mplane)?;
        check_queue_config(&dst, Direction::Capture, mplane)?;

        let coded = caps
            .coded_fmts()
            .first()
            .ok_or_else(|| Error::InvalidConfiguration("no coded formats".into()))?;
        let decoded = caps
            .decoded_fmts()
            .first()
            .ok_or_else(|| Error::InvalidConfiguration("no decoded formats".into()))?;
        let coded_dir = codec.codec_type().coded_direction();
        let coded_fmt = PixFormat::new(BufType::new(coded_dir, mplane), coded.fourcc);
        let decoded_fmt = PixFormat::new(BufType::new(coded_dir.opposite(), mplane), decoded.fourcc);

        let id = codec.device().register();
        let mut ctx = CodecContext {
            id,
            codec: codec.clone(),
            coded_fmt,
            decoded_fmt,
            coded_desc: None,
            decoded_desc: None,
            ctrl_hdl,
            out_q: VideoQueue::new(src),
            cap_q: VideoQueue::new(dst),
            priv_data: None,
            released: false,
        };

        // Dropping ctx on failure releases the scheduler registration.
        ctx.reset_coded_fmt()?;
        ctx.reset_decoded_fmt()?;

        log::info!(
            "{}: opened {} on {} ({} controls)",
            ctx.codec.name(),
            id,
            ctx.codec.codec_type(),
            ctx.ctrl_hdl.len()
        );
        Ok(ctx)
    }

    /// Close the session: detach from the scheduler and drop the control
    /// registry. Consuming the context makes a second cleanup impossible.
    pub fn cleanup(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.codec.device().release(self.id);
        self.ctrl_hdl = ControlHandler::default();
        log::info!("{}: closed {}", self.codec.name(), self.id);
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn codec(&self) -> &Arc<CodecInstance> {
        &self.codec
    }

    pub fn codec_type(&self) -> CodecType {
        self.codec.codec_type()
    }

    /// True when `dir` is the queue carrying coded data for this codec type
    pub fn is_coded_queue(&self, dir: Direction) -> bool {
        dir == self.codec_type().coded_direction()
    }

    /// Active coded format descriptor
    pub fn coded_fmt_desc(&self) -> Option<&CodedFormatDesc> {
        self.coded_desc
            .and_then(|i| self.codec.caps().coded_fmts().get(i))
    }

    /// Active decoded format descriptor
    pub fn decoded_fmt_desc(&self) -> Option<&DecodedFormatDesc> {
        self.decoded_desc
            .and_then(|i| self.codec.caps().decoded_fmts().get(i))
    }

    pub fn coded_fmt(&self) -> &PixFormat {
        &self.coded_fmt
    }

    pub fn decoded_fmt(&self) -> &PixFormat {
        &self.decoded_fmt
    }

    pub fn ctrls(&self) -> &ControlHandler {
        &self.ctrl_hdl
    }

    pub fn ctrls_mut(&mut self) -> &mut ControlHandler {
        &mut self.ctrl_hdl
    }

    pub fn queue(&self, dir: Direction) -> &VideoQueue {
        match dir {
            Direction::Output => &self.out_q,
            Direction::Capture => &self.cap_q,
        }
    }

    pub(crate) fn queue_mut(&mut self, dir: Direction) -> &mut VideoQueue {
        match dir {
            Direction::Output => &mut self.out_q,
            Direction::Capture => &mut self.cap_q,
        }
    }

    /// Attach driver private state to the context
    pub fn set_priv<T: Any + Send>(&mut self, data: T) {
        self.priv_data = Some(Box::new(data));
    }

    pub fn priv_ref<T: Any + Send>(&self) -> Option<&T> {
        self.priv_data.as_ref().and_then(|d| d.downcast_ref())
    }

    pub fn priv_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.priv_data.as_mut().and_then(|d| d.downcast_mut())
    }
}

impl Drop for CodecContext {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for CodecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecContext")
            .field("id", &self.id)
            .field("codec", &self.codec.name())
            .field("coded_fmt", &self.coded_fmt)
            .field("decoded_fmt", &self.decoded_fmt)
            .field("ctrls", &self.ctrl_hdl.len())
            .finish_non_exhaustive()
    }
}

/// Register the controls of every coded format up front
fn init_ctrls(codec: &CodecInstance) -> Result<ControlHandler, Error> {
    let caps = codec.caps();
    let mut hdl = ControlHandler::with_capacity(caps.total_ctrls())?;
    for desc in caps.coded_fmts() {
        for ctrl in &desc.ctrls {
            hdl.add(&ctrl.config)?;
        }
    }
    hdl.setup();
    Ok(hdl)
}

fn check_queue_config(cfg: &QueueConfig, dir: Direction, mplane: bool) -> Result<(), Error> {
    if cfg.buf_type.direction() != dir {
        return Err(Error::InvalidConfiguration(format!(
            "queue_init turned the {} queue into {}",
            dir, cfg.buf_type
        )));
    }
    if cfg.buf_type.is_multiplanar() != mplane {
        return Err(Error::InvalidConfiguration(format!(
            "{} queue planarity does not match the codec",
            dir
        )));
    }
    Ok(())
}
