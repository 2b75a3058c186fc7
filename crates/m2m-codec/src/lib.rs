// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Memory-to-memory Codec Framework
//!
//! Building blocks for stateless hardware video codec drivers: devices that
//! read coded (compressed) data from one buffer queue and write decoded (raw)
//! frames to another, or the reverse for encoders.
//!
//! The driver describes what its hardware supports with a [`caps::CodecCaps`]
//! table. The framework takes care of the rest of the plumbing that every
//! such driver otherwise rewrites:
//!
//! - format negotiation on both queues, with the coded side driving frame
//!   size constraints and colorimetry onto the decoded side
//! - a control registry holding every control any coded format may need
//! - media request validation (exactly one buffer, all mandatory per-request
//!   controls present)
//! - buffer queue helpers (setup, prepare, cleanup on stream stop)
//! - job dispatch from the one-job-at-a-time scheduler to the active coded
//!   format's `run` hook, and job completion
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use m2m_codec::caps::{CodecCaps, CodedFormatDesc, CodedFormatOps, DecodedFormatDesc};
//! use m2m_codec::codec::{CodecInstance, CodecOps, CodecType};
//! use m2m_codec::context::CodecContext;
//! use m2m_codec::format::{Direction, FrameSizeStepwise};
//! use m2m_codec::fourcc::FourCC;
//! use m2m_codec::h264;
//! use m2m_codec::queue::QueueConfig;
//! use m2m_codec::scheduler::M2mDevice;
//!
//! struct H264Ops;
//!
//! impl CodedFormatOps for H264Ops {
//!     fn run(&self, ctx: &mut CodecContext) -> Result<(), m2m_codec::Error> {
//!         let run = h264::H264DecodeRun::preamble(ctx)?;
//!         // Program the hardware here.
//!         run.postamble(ctx);
//!         Ok(())
//!     }
//! }
//!
//! struct Ops;
//!
//! impl CodecOps for Ops {
//!     fn queue_init(&self, src: &mut QueueConfig, dst: &mut QueueConfig) -> Result<(), m2m_codec::Error> {
//!         src.supports_requests = true;
//!         Ok(())
//!     }
//! }
//!
//! let caps = CodecCaps::new(
//!     vec![CodedFormatDesc::new(FourCC::H264_SLICE)
//!         .with_requires_requests(true)
//!         .with_frmsize(FrameSizeStepwise::new(48, 3840, 16, 48, 2160, 16))
//!         .with_ctrls(h264::decoder_controls(0, h264::DECODE_MODE_FRAME_BASED))
//!         .with_ops(Arc::new(H264Ops))],
//!     vec![DecodedFormatDesc::new(FourCC::NV12)],
//! );
//!
//! let codec = CodecInstance::new(
//!     CodecType::Decoder,
//!     M2mDevice::new(),
//!     caps,
//!     Arc::new(Ops),
//!     "vdec",
//! )?;
//!
//! let ctx = CodecContext::new(&codec)?;
//! println!("coded: {}", ctx.g_fmt(Direction::Output).pixelformat);
//! # Ok::<(), m2m_codec::Error>(())
//! ```

use std::{error, fmt, io};

use crate::format::BufType;
use crate::fourcc::FourCC;

/// Error type for codec framework operations
#[derive(Debug)]
pub enum Error {
    /// Malformed capability descriptor or device description; the device
    /// cannot be brought up.
    InvalidConfiguration(String),

    /// The requested fourcc is not part of the capability tables
    UnsupportedFormat(FourCC),

    /// A format, control, buffer or request object could not be found
    NotFound(String),

    /// The queue has buffers allocated and cannot be reconfigured
    Busy(BufType),

    /// Size, count, value or control mismatch rejecting a single call
    InvalidArgument(String),

    /// Control registry allocation failed while creating a context
    ResourceExhausted(String),

    /// I/O error surfaced by a driver hook
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidConfiguration(msg) => write!(f, "invalid configuration: {}", msg),
            Error::UnsupportedFormat(fourcc) => write!(f, "unsupported format: {}", fourcc),
            Error::NotFound(what) => write!(f, "not found: {}", what),
            Error::Busy(buf_type) => write!(f, "{} queue is busy", buf_type),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// The fourcc module provides portable handling of fourcc codes.
pub mod fourcc;

/// The format module describes negotiated formats and pixel layouts.
pub mod format;

/// The caps module provides the driver-supplied capability tables.
pub mod caps;

/// The ctrls module provides the control registry and media requests.
pub mod ctrls;

/// The queue module provides the buffer queues feeding the codec.
pub mod queue;

/// The scheduler module serializes jobs on a device.
pub mod scheduler;

/// The codec module binds capabilities to a device endpoint.
pub mod codec;

/// The context module holds per-session codec state.
pub mod context;

mod negotiate;

mod vb2;

mod request;

/// The job module bridges scheduler dispatch to the coded format hooks.
pub mod job;

/// The completion module carries asynchronous hardware completions.
pub mod completion;

/// The h264 module provides helpers for stateless H.264 decoders.
pub mod h264;

pub use codec::{CodecInstance, CodecType};
pub use context::CodecContext;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedFormat(FourCC::H264);
        assert_eq!(format!("{}", err), "unsupported format: H264");

        let err = Error::Busy(BufType::VideoOutputMplane);
        assert_eq!(format!("{}", err), "output (mplane) queue is busy");
    }

    #[test]
    fn test_error_source() {
        use std::error::Error as _;

        let err = Error::from(io::Error::new(io::ErrorKind::Other, "irq"));
        assert!(err.source().is_some());
        assert!(Error::NotFound("ctrl".into()).source().is_none());
    }
}
