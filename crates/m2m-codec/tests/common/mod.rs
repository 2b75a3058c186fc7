// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use m2m_codec::caps::{CodecCaps, CodedFormatDesc, CodedFormatOps, DecodedFormatDesc};
use m2m_codec::codec::{CodecInstance, CodecOps, CodecType};
use m2m_codec::completion::CompletionSender;
use m2m_codec::context::CodecContext;
use m2m_codec::format::{FrameSizeStepwise, PixFormat};
use m2m_codec::fourcc::FourCC;
use m2m_codec::h264::{self, H264DecodeRun};
use m2m_codec::queue::{BufferState, QueueConfig};
use m2m_codec::scheduler::M2mDevice;
use m2m_codec::Error;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// H.264 format hooks recording what each run saw. Completions are sent
/// straight from `run` when a sender is installed.
#[derive(Default)]
pub struct H264Ops {
    pub runs: AtomicUsize,
    pub sps_seen: Mutex<Vec<u8>>,
    pub done: Mutex<Option<CompletionSender>>,
    pub fail_start: bool,
    /// Give up after the preamble without finishing the run
    pub fail_run: bool,
}

impl H264Ops {
    pub fn new() -> Arc<H264Ops> {
        Arc::new(H264Ops::default())
    }
}

impl CodedFormatOps for H264Ops {
    // Bitstream buffers are sized like a 4:2:0 frame.
    fn adjust_fmt(&self, _ctx: &CodecContext, f: &mut PixFormat) -> Result<(), Error> {
        f.plane_fmt[0].bytesperline = 0;
        f.plane_fmt[0].sizeimage = f.width * f.height * 3 / 2;
        Ok(())
    }

    fn start(&self, _ctx: &mut CodecContext) -> Result<(), Error> {
        if self.fail_start {
            return Err(Error::InvalidArgument("start refused".into()));
        }
        Ok(())
    }

    fn run(&self, ctx: &mut CodecContext) -> Result<(), Error> {
        let run = H264DecodeRun::preamble(ctx)?;
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail_run {
            drop(run);
            return Err(Error::InvalidArgument("bitstream rejected".into()));
        }
        if let Some(sps) = &run.sps {
            *self.sps_seen.lock().unwrap() = sps.clone();
        }
        run.postamble(ctx);

        if let Some(tx) = self.done.lock().unwrap().as_ref() {
            tx.complete(ctx.id(), BufferState::Done);
        }
        Ok(())
    }
}

pub struct Plain {
    pub multiplanar: bool,
}

impl CodecOps for Plain {
    fn queue_init(&self, src: &mut QueueConfig, _dst: &mut QueueConfig) -> Result<(), Error> {
        src.supports_requests = true;
        Ok(())
    }

    fn multiplanar(&self) -> bool {
        self.multiplanar
    }
}

pub const H264_FRMSIZE: FrameSizeStepwise = FrameSizeStepwise::new(48, 1920, 16, 48, 1088, 16);

/// H.264 slice decoder producing NV12, the way a stateless VPU describes
/// itself
pub fn h264_codec(ops: Arc<H264Ops>, multiplanar: bool) -> Arc<CodecInstance> {
    let caps = CodecCaps::new(
        vec![CodedFormatDesc::new(FourCC::H264_SLICE)
            .with_requires_requests(true)
            .with_frmsize(H264_FRMSIZE)
            .with_ctrls(h264::decoder_controls(0, h264::DECODE_MODE_FRAME_BASED))
            .with_ops(ops)],
        vec![DecodedFormatDesc::new(FourCC::NV12)],
    );
    CodecInstance::new(
        CodecType::Decoder,
        M2mDevice::new(),
        caps,
        Arc::new(Plain { multiplanar }),
        "test-vdec",
    )
    .unwrap()
}
