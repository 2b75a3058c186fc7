// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Push frames through a virtual codec
//!
//! Buffers are allocated on both queues, capture buffers are queued up
//! front and output buffers are submitted one frame at a time, through a
//! media request when the coded format needs one. Finished buffers are
//! recycled until the requested number of frames has gone through.

use crate::error::CliError;
use crate::metrics::JobMetrics;
use crate::profile::DeviceProfile;
use crate::utils::{install_signal_handler, parse_resolution};
use crate::virt::VirtualDevice;
use clap::Args as ClapArgs;
use m2m_codec::caps::{ControlDesc, ControlKind};
use m2m_codec::completion::{CompletionReceiver, JobDispatcher};
use m2m_codec::context::CodecContext;
use m2m_codec::ctrls::{ControlValue, MediaRequest};
use m2m_codec::format::Direction;
use m2m_codec::queue::{BufferState, VideoBuffer, BUF_FLAG_KEYFRAME, BUF_FLAG_PFRAME};
use m2m_codec::scheduler::ContextId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use unix_ts::Timestamp;

/// Frame clock of the submitted stream
const FRAME_RATE: u32 = 30;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Device profile: a built-in name or a JSON file
    #[arg(short, long)]
    profile: Option<String>,

    /// Number of frames to push through the codec
    #[arg(short, long, default_value_t = 30)]
    frames: u32,

    /// Buffers allocated on each queue
    #[arg(short, long, default_value_t = 4)]
    buffers: u32,

    /// Frame size (e.g. 1280x720)
    #[arg(short, long)]
    size: Option<String>,

    /// Keyframe interval in frames
    #[arg(long, default_value_t = 30)]
    gop: u32,

    /// Give up when no job completes within this many milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
}

/// A submitted frame waiting for its capture buffer
struct InFlight {
    timestamp: Timestamp,
    submitted: Instant,
}

fn frame_timestamp(frame: u32) -> Timestamp {
    let nanos_per_frame = 1_000_000_000 / FRAME_RATE;
    Timestamp::new(
        i64::from(frame / FRAME_RATE),
        (frame % FRAME_RATE) * nanos_per_frame,
    )
}

/// Payload for a control a request must carry
fn request_value(desc: &ControlDesc, frame: u32) -> ControlValue {
    match desc.config.kind {
        ControlKind::Compound { size } => ControlValue::Compound(vec![frame as u8; size]),
        ref kind => ControlValue::default_for(kind),
    }
}

struct Session {
    id: ContextId,
    frames: u32,
    timeout: Duration,
    uses_requests: bool,
    required: Vec<ControlDesc>,
    gop: u32,
}

impl Session {
    fn submit(&self, ctx: &mut CodecContext, mut buf: VideoBuffer, frame: u32) -> Result<u64, CliError> {
        buf.timestamp = frame_timestamp(frame);
        buf.flags = if frame % self.gop == 0 {
            BUF_FLAG_KEYFRAME
        } else {
            BUF_FLAG_PFRAME
        };
        for plane in buf.planes.iter_mut() {
            plane.bytesused = plane.length;
        }
        let bytes = buf.bytesused();

        if self.uses_requests {
            let req = MediaRequest::new();
            req.attach(buf);
            for desc in &self.required {
                ctx.set_request_control(&req, desc.config.id, request_value(desc, frame))?;
            }
            ctx.queue_request(&req)?;
            log::trace!("{}: frame {} queued in request {}", self.id, frame, req.id());
        } else {
            ctx.qbuf(buf)?;
            log::trace!("{}: frame {} queued", self.id, frame);
        }
        Ok(bytes)
    }

    /// Submit, dispatch and recycle until every frame has come back
    fn drive(
        &self,
        dispatcher: &mut JobDispatcher,
        completions: &CompletionReceiver,
        mut free: VecDeque<VideoBuffer>,
        metrics: &mut JobMetrics,
        term: &AtomicBool,
    ) -> Result<(), CliError> {
        let id = self.id;
        let vanished = || CliError::General(format!("{} vanished", id));
        let mut in_flight = VecDeque::new();
        let mut submitted = 0;

        loop {
            if term.load(Ordering::Relaxed) {
                log::warn!("Interrupted after {} frames", metrics.finished());
                return Ok(());
            }

            let ctx = dispatcher.get_mut(id).ok_or_else(vanished)?;
            while submitted < self.frames {
                let Some(buf) = free.pop_front() else { break };
                metrics.record_bytes_in(self.submit(ctx, buf, submitted)?);
                in_flight.push_back(InFlight {
                    timestamp: frame_timestamp(submitted),
                    submitted: Instant::now(),
                });
                submitted += 1;
            }

            dispatcher.kick(id);
            let ctx = dispatcher.get_mut(id).ok_or_else(vanished)?;

            let mut drained = 0;
            while let Ok(buf) = ctx.dqbuf(Direction::Output) {
                free.push_back(buf);
                drained += 1;
            }
            while let Ok(buf) = ctx.dqbuf(Direction::Capture) {
                drained += 1;
                let Some(frame) = in_flight.pop_front() else {
                    log::warn!("{}: capture buffer {} without a frame", id, buf.index());
                    ctx.qbuf(buf)?;
                    continue;
                };
                if buf.timestamp != frame.timestamp {
                    log::warn!(
                        "{}: capture buffer {} carries {}.{} instead of {}.{}",
                        id,
                        buf.index(),
                        buf.timestamp.seconds(),
                        buf.timestamp.subsec(9),
                        frame.timestamp.seconds(),
                        frame.timestamp.subsec(9)
                    );
                }
                match buf.state() {
                    BufferState::Done => {
                        metrics.record_done(frame.submitted.elapsed(), buf.bytesused())
                    }
                    state => {
                        log::warn!("{}: frame came back {}", id, state);
                        metrics.record_failed();
                    }
                }
                ctx.qbuf(buf)?;
            }

            if metrics.finished() >= u64::from(self.frames) {
                return Ok(());
            }
            if drained > 0 {
                continue;
            }

            let done = completions.recv_timeout(self.timeout).ok_or_else(|| {
                CliError::Timeout(format!(
                    "no job completed within {} ms",
                    self.timeout.as_millis()
                ))
            })?;
            dispatcher.complete(done);
        }
    }
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    if args.frames == 0 {
        return Err(CliError::InvalidArgs("--frames must be positive".into()));
    }
    if args.buffers == 0 {
        return Err(CliError::InvalidArgs("--buffers must be positive".into()));
    }
    if args.gop == 0 {
        return Err(CliError::InvalidArgs("--gop must be positive".into()));
    }
    let size = args.size.as_deref().map(parse_resolution).transpose()?;

    let profile = DeviceProfile::load(args.profile.as_deref())?;
    let mut dev = VirtualDevice::open(profile)?;
    let term = install_signal_handler()?;

    let mut ctx = CodecContext::new(&dev.codec)?;
    if let Some((width, height)) = size {
        for dir in [ctx.codec_type().coded_direction(), ctx.codec_type().decoded_direction()] {
            let mut f = ctx.g_fmt(dir).clone();
            f.width = width;
            f.height = height;
            ctx.s_fmt(&mut f)?;
        }
    }
    log::info!(
        "{}: {} -> {}",
        dev.codec.name(),
        ctx.g_fmt(Direction::Output),
        ctx.g_fmt(Direction::Capture)
    );

    let session = Session {
        id: ctx.id(),
        frames: args.frames,
        timeout: Duration::from_millis(args.timeout_ms),
        uses_requests: ctx.queue(Direction::Output).requires_requests(),
        required: ctx
            .coded_fmt_desc()
            .map(|desc| desc.required_ctrls().cloned().collect())
            .unwrap_or_default(),
        gop: args.gop,
    };

    let free: VecDeque<VideoBuffer> = ctx.reqbufs(Direction::Output, args.buffers)?.into();
    for buf in ctx.reqbufs(Direction::Capture, args.buffers)? {
        ctx.qbuf(buf)?;
    }
    ctx.streamon(Direction::Output)?;
    ctx.streamon(Direction::Capture)?;

    let mut dispatcher = JobDispatcher::new();
    let id = dispatcher.insert(ctx);
    let mut metrics = JobMetrics::new();
    let result = session.drive(
        &mut dispatcher,
        &dev.completions,
        free,
        &mut metrics,
        &term,
    );

    if let Some(mut ctx) = dispatcher.remove(id) {
        for dir in [Direction::Output, Direction::Capture] {
            if let Err(e) = ctx.streamoff(dir) {
                log::warn!("{}: {} stream off failed: {}", id, dir, e);
            }
        }
        ctx.cleanup();
    }
    dev.hw.shutdown();
    result?;

    if json {
        metrics.print_json()?;
    } else {
        metrics.print_text();
    }
    Ok(())
}
