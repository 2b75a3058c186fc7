// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Virtual codec hardware
//!
//! Stands in for a VPU: each job handed over by a coded format's `run` hook
//! is held for the profile latency on a worker thread, then reported back
//! through the completion channel.

use crate::error::CliError;
use crate::profile::DeviceProfile;
use crossbeam_channel::{select, Receiver, Sender};
use m2m_codec::caps::CodedFormatOps;
use m2m_codec::codec::{CodecInstance, CodecOps};
use m2m_codec::completion::{completion_channel, CompletionReceiver, CompletionSender};
use m2m_codec::context::CodecContext;
use m2m_codec::format::PixFormat;
use m2m_codec::fourcc::FourCC;
use m2m_codec::h264::H264DecodeRun;
use m2m_codec::queue::{BufferState, QueueConfig};
use m2m_codec::scheduler::{ContextId, M2mDevice};
use m2m_codec::Error;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Worst case bitstream bytes per pixel
const MAX_DEPTH_IN_BYTES: u32 = 2;

#[derive(Debug)]
struct HwJob {
    ctx: ContextId,
    fourcc: FourCC,
    submitted: Instant,
}

/// Per-stream state kept in the context while the coded queue streams
#[derive(Debug, Default)]
struct StreamState {
    jobs: u64,
}

/// Worker thread completing jobs after a fixed latency
pub struct VirtualHardware {
    jobs: Sender<HwJob>,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<u64>>,
}

impl VirtualHardware {
    pub fn spawn(latency: Duration, done: CompletionSender) -> Result<VirtualHardware, io::Error> {
        let (jobs, job_rx) = crossbeam_channel::unbounded();
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded(0);

        let thread = thread::Builder::new()
            .name("virt-hw".into())
            .spawn(move || hw_thread(latency, job_rx, shutdown_rx, done))?;

        Ok(VirtualHardware {
            jobs,
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// Coded format hooks feeding this hardware
    pub fn format_ops(&self, fourcc: FourCC) -> VirtualFormat {
        VirtualFormat {
            fourcc,
            jobs: self.jobs.clone(),
        }
    }

    /// Stop the worker. Returns the number of jobs it completed.
    pub fn shutdown(&mut self) -> u64 {
        drop(self.shutdown.take());
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(jobs)) => jobs,
            Some(Err(_)) => {
                log::error!("virtual hardware thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for VirtualHardware {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn hw_thread(
    latency: Duration,
    jobs: Receiver<HwJob>,
    shutdown: Receiver<()>,
    done: CompletionSender,
) -> u64 {
    let mut completed = 0;
    loop {
        select! {
            recv(jobs) -> job => {
                let Ok(job) = job else { break };
                // Jobs run back to back; a late job only waits for what is left.
                if let Some(left) = latency.checked_sub(job.submitted.elapsed()) {
                    thread::sleep(left);
                }
                log::trace!("{}: {} job done after {:?}", job.ctx, job.fourcc, job.submitted.elapsed());
                if !done.complete(job.ctx, BufferState::Done) {
                    break;
                }
                completed += 1;
            }
            recv(shutdown) -> _ => break,
        }
    }
    log::debug!("virtual hardware stopped after {} jobs", completed);
    completed
}

/// Coded format hooks submitting jobs to [`VirtualHardware`]
pub struct VirtualFormat {
    fourcc: FourCC,
    jobs: Sender<HwJob>,
}

impl CodedFormatOps for VirtualFormat {
    fn adjust_fmt(&self, _ctx: &CodecContext, f: &mut PixFormat) -> Result<(), Error> {
        f.num_planes = 1;
        f.plane_fmt[0].bytesperline = 0;
        f.plane_fmt[0].sizeimage = f
            .width
            .checked_mul(f.height)
            .and_then(|pixels| pixels.checked_mul(MAX_DEPTH_IN_BYTES))
            .ok_or_else(|| {
                let msg = format!("{} {}x{} bitstream too large", self.fourcc, f.width, f.height);
                Error::InvalidArgument(msg)
            })?;
        Ok(())
    }

    fn start(&self, ctx: &mut CodecContext) -> Result<(), Error> {
        log::debug!("{}: {} stream start", ctx.id(), self.fourcc);
        ctx.set_priv(StreamState::default());
        Ok(())
    }

    fn stop(&self, ctx: &mut CodecContext) {
        let jobs = ctx.priv_ref::<StreamState>().map_or(0, |s| s.jobs);
        log::debug!("{}: {} stream stop after {} jobs", ctx.id(), self.fourcc, jobs);
    }

    fn run(&self, ctx: &mut CodecContext) -> Result<(), Error> {
        if self.fourcc == FourCC::H264_SLICE {
            let run = H264DecodeRun::preamble(ctx)?;
            if run.sps.is_none() || run.pps.is_none() {
                log::warn!("{}: decoding without parameter sets", ctx.id());
            }
            run.postamble(ctx);
        } else {
            let run = ctx.run_preamble()?;
            ctx.run_postamble(run);
        }

        // The virtual decoder fills the whole destination.
        if let Some((_, dst)) = ctx.job_buffers_mut() {
            for plane in dst.planes.iter_mut() {
                plane.bytesused = plane.length;
            }
        }
        if let Some(state) = ctx.priv_mut::<StreamState>() {
            state.jobs += 1;
        }

        self.jobs
            .send(HwJob {
                ctx: ctx.id(),
                fourcc: self.fourcc,
                submitted: Instant::now(),
            })
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "virtual hardware stopped")))
    }
}

/// Codec level hooks of the virtual device
pub struct VirtualOps {
    pub multiplanar: bool,
    pub supports_requests: bool,
}

impl CodecOps for VirtualOps {
    fn queue_init(&self, src: &mut QueueConfig, dst: &mut QueueConfig) -> Result<(), Error> {
        src.supports_requests = self.supports_requests;
        src.min_buffers = 1;
        dst.min_buffers = 1;
        Ok(())
    }

    fn multiplanar(&self) -> bool {
        self.multiplanar
    }
}

/// A codec instance built from a profile, its hardware and the receiving
/// end of its completions
pub struct VirtualDevice {
    pub profile: DeviceProfile,
    pub codec: Arc<CodecInstance>,
    pub completions: CompletionReceiver,
    pub hw: VirtualHardware,
}

impl VirtualDevice {
    pub fn open(profile: DeviceProfile) -> Result<VirtualDevice, CliError> {
        let (tx, completions) = completion_channel();
        let hw = VirtualHardware::spawn(Duration::from_micros(profile.latency_us), tx)
            .map_err(|e| CliError::General(format!("Failed to start virtual hardware: {}", e)))?;

        let caps = profile.to_caps(|fourcc| -> Arc<dyn CodedFormatOps> { Arc::new(hw.format_ops(fourcc)) })?;
        let ops = VirtualOps {
            multiplanar: profile.multiplanar,
            supports_requests: profile.uses_requests(),
        };
        let codec = CodecInstance::new(
            profile.codec_type(),
            M2mDevice::new(),
            caps,
            Arc::new(ops),
            &profile.name,
        )?;
        log::debug!("Opened {} {} ({})", codec.codec_type(), codec.name(), codec.bus_info());

        Ok(VirtualDevice {
            profile,
            codec,
            completions,
            hw,
        })
    }
}
