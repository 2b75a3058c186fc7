// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Codec instances
//!
//! A [`CodecInstance`] is one registered codec endpoint: its type, its
//! capability table and the driver hooks the framework calls back into.
//! Every context opened on the endpoint shares the instance.

use std::fmt;
use std::sync::Arc;

use crate::caps::CodecCaps;
use crate::format::Direction;
use crate::queue::QueueConfig;
use crate::scheduler::M2mDevice;
use crate::Error;

/// Longest endpoint name, in bytes
pub const MAX_NAME_LEN: usize = 31;

/// Which way data flows through the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    /// Raw frames in, coded data out
    Encoder,
    /// Coded data in, raw frames out
    Decoder,
}

impl CodecType {
    /// Queue carrying coded data
    pub fn coded_direction(self) -> Direction {
        match self {
            CodecType::Decoder => Direction::Output,
            CodecType::Encoder => Direction::Capture,
        }
    }

    /// Queue carrying raw frames
    pub fn decoded_direction(self) -> Direction {
        self.coded_direction().opposite()
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecType::Encoder => write!(f, "encoder"),
            CodecType::Decoder => write!(f, "decoder"),
        }
    }
}

/// Device capability flags reported to applications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCaps(pub u32);

impl DeviceCaps {
    pub const VIDEO_M2M_MPLANE: DeviceCaps = DeviceCaps(0x0000_4000);
    pub const VIDEO_M2M: DeviceCaps = DeviceCaps(0x0000_8000);
    pub const STREAMING: DeviceCaps = DeviceCaps(0x0400_0000);

    pub fn contains(self, other: DeviceCaps) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for DeviceCaps {
    type Output = DeviceCaps;

    fn bitor(self, rhs: DeviceCaps) -> DeviceCaps {
        DeviceCaps(self.0 | rhs.0)
    }
}

impl fmt::Display for DeviceCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(DeviceCaps::VIDEO_M2M) {
            names.push("video-m2m");
        }
        if self.contains(DeviceCaps::VIDEO_M2M_MPLANE) {
            names.push("video-m2m-mplane");
        }
        if self.contains(DeviceCaps::STREAMING) {
            names.push("streaming");
        }
        write!(f, "{}", names.join(" | "))
    }
}

/// Hooks a driver provides for the whole codec
pub trait CodecOps: Send + Sync {
    /// Adjust the queue parameters of a new context. `src` is the OUTPUT
    /// queue, `dst` the CAPTURE queue. Buffer types may be changed but not
    /// their direction.
    fn queue_init(&self, src: &mut QueueConfig, dst: &mut QueueConfig) -> Result<(), Error>;

    /// Use the multi-planar API
    fn multiplanar(&self) -> bool {
        false
    }
}

/// A registered codec endpoint
pub struct CodecInstance {
    codec_type: CodecType,
    device: Arc<M2mDevice>,
    caps: CodecCaps,
    ops: Arc<dyn CodecOps>,
    name: String,
}

impl CodecInstance {
    /// Register a codec. The capability table is validated here so the
    /// framework can rely on it afterwards.
    pub fn new(
        codec_type: CodecType,
        device: Arc<M2mDevice>,
        caps: CodecCaps,
        ops: Arc<dyn CodecOps>,
        name: &str,
    ) -> Result<Arc<CodecInstance>, Error> {
        if name.is_empty() {
            return Err(Error::InvalidConfiguration("empty codec name".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(Error::InvalidConfiguration(format!(
                "codec name {:?} longer than {} bytes",
                name, MAX_NAME_LEN
            )));
        }
        caps.validate()?;

        log::debug!(
            "registered {} {} with {} coded and {} decoded formats",
            codec_type,
            name,
            caps.coded_fmts().len(),
            caps.decoded_fmts().len()
        );

        Ok(Arc::new(CodecInstance {
            codec_type,
            device,
            caps,
            ops,
            name: name.to_owned(),
        }))
    }

    pub fn codec_type(&self) -> CodecType {
        self.codec_type
    }

    pub fn device(&self) -> &Arc<M2mDevice> {
        &self.device
    }

    pub fn caps(&self) -> &CodecCaps {
        &self.caps
    }

    pub fn ops(&self) -> &Arc<dyn CodecOps> {
        &self.ops
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_multiplanar(&self) -> bool {
        self.ops.multiplanar()
    }

    /// Capabilities advertised by the endpoint
    pub fn device_caps(&self) -> DeviceCaps {
        let m2m = if self.is_multiplanar() {
            DeviceCaps::VIDEO_M2M_MPLANE
        } else {
            DeviceCaps::VIDEO_M2M
        };
        DeviceCaps::STREAMING | m2m
    }

    /// Bus info string: `platform:<name>`
    pub fn bus_info(&self) -> String {
        format!("platform:{}", self.name)
    }
}

impl fmt::Debug for CodecInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecInstance")
            .field("codec_type", &self.codec_type)
            .field("name", &self.name)
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}
