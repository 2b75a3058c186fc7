// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Codec capability tables
//!
//! A driver describes its hardware with one [`CodecCaps`] value: the coded
//! formats it can consume or produce, the raw formats on the other side, and
//! for each coded format its frame size constraint, its controls and the
//! [`CodedFormatOps`] implementing the hardware specific parts.
//!
//! The tables are immutable once handed to
//! [`CodecInstance::new`](crate::codec::CodecInstance::new), which validates
//! them. Lookups are linear scans in declaration order; the first entry of
//! each table is the default format of a new context.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::context::CodecContext;
use crate::format::{FrameSizeStepwise, PixFormat};
use crate::fourcc::FourCC;
use crate::Error;

/// Control identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub u32);

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Type and range of a control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    /// Signed integer in `[min, max]`, reachable from `min` in `step` increments
    Integer {
        min: i64,
        max: i64,
        step: u64,
        default: i64,
    },
    /// On/off switch
    Boolean { default: bool },
    /// Menu index in `[min, max]`; bit `n` of `skip_mask` hides item `n`
    Menu {
        min: i64,
        max: i64,
        skip_mask: u64,
        default: i64,
    },
    /// Opaque payload of exactly `size` bytes, zero-filled by default
    Compound { size: usize },
}

/// Configuration of one control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlConfig {
    pub id: ControlId,
    pub name: String,
    pub kind: ControlKind,
}

impl ControlConfig {
    pub fn new(id: ControlId, name: impl Into<String>, kind: ControlKind) -> ControlConfig {
        ControlConfig {
            id,
            name: name.into(),
            kind,
        }
    }

    /// Check the configuration is self-consistent
    pub fn validate(&self) -> Result<(), Error> {
        let bad = |why: &str| {
            Err(Error::InvalidConfiguration(format!(
                "control {} ({}): {}",
                self.name, self.id, why
            )))
        };

        match self.kind {
            ControlKind::Integer {
                min,
                max,
                step,
                default,
            } => {
                if min > max {
                    return bad("min above max");
                }
                if step == 0 {
                    return bad("zero step");
                }
                if default < min || default > max {
                    return bad("default out of range");
                }
            }
            ControlKind::Boolean { .. } => {}
            ControlKind::Menu {
                min,
                max,
                skip_mask,
                default,
            } => {
                if min < 0 || min > max || max > 63 {
                    return bad("menu range must lie within 0..=63");
                }
                if default < min || default > max {
                    return bad("default out of range");
                }
                if skip_mask & (1 << default) != 0 {
                    return bad("default menu item is skipped");
                }
            }
            ControlKind::Compound { size } => {
                if size == 0 {
                    return bad("zero payload size");
                }
            }
        }
        Ok(())
    }
}

/// Control attached to a coded format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDesc {
    /// Must be supplied with every request
    pub per_request: bool,
    /// Checked at request validation time (together with `per_request`)
    pub mandatory: bool,
    pub config: ControlConfig,
}

impl ControlDesc {
    pub fn new(config: ControlConfig) -> ControlDesc {
        ControlDesc {
            per_request: false,
            mandatory: false,
            config,
        }
    }

    pub fn per_request(mut self, per_request: bool) -> ControlDesc {
        self.per_request = per_request;
        self
    }

    pub fn mandatory(mut self, mandatory: bool) -> ControlDesc {
        self.mandatory = mandatory;
        self
    }

    /// Whether request validation requires this control
    pub fn required_per_request(&self) -> bool {
        self.per_request && self.mandatory
    }
}

/// Hardware specific hooks of a coded format
///
/// Only [`run`](CodedFormatOps::run) is required. It is called from
/// [`CodecContext::device_run`] with the device reserved for this context;
/// it is expected to program the hardware and return without waiting. The
/// hardware completion is reported later through
/// [`CodecContext::job_finish`], usually via a
/// [`CompletionSender`](crate::completion::CompletionSender).
pub trait CodedFormatOps: Send + Sync {
    /// Tweak a coded format before it is handed back to the application,
    /// typically to set the bitstream buffer size. May reject the format.
    fn adjust_fmt(&self, _ctx: &CodecContext, _f: &mut PixFormat) -> Result<(), Error> {
        Ok(())
    }

    /// Coded queue starts streaming; allocate per-stream state here
    fn start(&self, _ctx: &mut CodecContext) -> Result<(), Error> {
        Ok(())
    }

    /// Coded queue stops streaming; release what `start` allocated
    fn stop(&self, _ctx: &mut CodecContext) {}

    /// Trigger the hardware for the next job
    fn run(&self, ctx: &mut CodecContext) -> Result<(), Error>;
}

/// One supported coded format
#[derive(Clone)]
pub struct CodedFormatDesc {
    pub fourcc: FourCC,
    /// Jobs need a media request bundling the per-frame controls
    pub requires_requests: bool,
    pub frmsize: Option<FrameSizeStepwise>,
    pub ctrls: Vec<ControlDesc>,
    pub ops: Option<Arc<dyn CodedFormatOps>>,
}

impl CodedFormatDesc {
    pub fn new(fourcc: FourCC) -> CodedFormatDesc {
        CodedFormatDesc {
            fourcc,
            requires_requests: false,
            frmsize: None,
            ctrls: Vec::new(),
            ops: None,
        }
    }

    pub fn with_requires_requests(mut self, requires_requests: bool) -> CodedFormatDesc {
        self.requires_requests = requires_requests;
        self
    }

    pub fn with_frmsize(mut self, frmsize: FrameSizeStepwise) -> CodedFormatDesc {
        self.frmsize = Some(frmsize);
        self
    }

    pub fn with_ctrls(mut self, ctrls: Vec<ControlDesc>) -> CodedFormatDesc {
        self.ctrls = ctrls;
        self
    }

    pub fn with_ops(mut self, ops: Arc<dyn CodedFormatOps>) -> CodedFormatDesc {
        self.ops = Some(ops);
        self
    }

    /// Format hooks. Always present once the tables have been validated.
    pub fn ops(&self) -> Result<&Arc<dyn CodedFormatOps>, Error> {
        self.ops.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration(format!("coded format {} has no ops", self.fourcc))
        })
    }

    /// Controls request validation insists on
    pub fn required_ctrls(&self) -> impl Iterator<Item = &ControlDesc> {
        self.ctrls.iter().filter(|c| c.required_per_request())
    }
}

impl fmt::Debug for CodedFormatDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodedFormatDesc")
            .field("fourcc", &self.fourcc)
            .field("requires_requests", &self.requires_requests)
            .field("frmsize", &self.frmsize)
            .field("ctrls", &self.ctrls)
            .field("ops", &self.ops.is_some())
            .finish()
    }
}

/// One supported raw format
#[derive(Clone)]
pub struct DecodedFormatDesc {
    pub fourcc: FourCC,
    /// Driver private data
    pub priv_data: Option<Arc<dyn Any + Send + Sync>>,
}

impl DecodedFormatDesc {
    pub fn new(fourcc: FourCC) -> DecodedFormatDesc {
        DecodedFormatDesc {
            fourcc,
            priv_data: None,
        }
    }

    pub fn with_priv(mut self, priv_data: Arc<dyn Any + Send + Sync>) -> DecodedFormatDesc {
        self.priv_data = Some(priv_data);
        self
    }

    /// Driver private data downcast to its concrete type
    pub fn priv_as<T: Any>(&self) -> Option<&T> {
        self.priv_data.as_deref().and_then(|p| p.downcast_ref::<T>())
    }
}

impl fmt::Debug for DecodedFormatDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedFormatDesc")
            .field("fourcc", &self.fourcc)
            .field("priv_data", &self.priv_data.is_some())
            .finish()
    }
}

/// Formats supported by a codec
#[derive(Debug, Clone)]
pub struct CodecCaps {
    coded_fmts: Vec<CodedFormatDesc>,
    decoded_fmts: Vec<DecodedFormatDesc>,
}

impl CodecCaps {
    pub fn new(coded_fmts: Vec<CodedFormatDesc>, decoded_fmts: Vec<DecodedFormatDesc>) -> CodecCaps {
        CodecCaps {
            coded_fmts,
            decoded_fmts,
        }
    }

    /// Reject tables the framework cannot work with: empty format lists,
    /// coded formats without ops, broken frame size constraints or control
    /// configurations.
    pub fn validate(&self) -> Result<(), Error> {
        if self.coded_fmts.is_empty() {
            return Err(Error::InvalidConfiguration("no coded format".into()));
        }
        if self.decoded_fmts.is_empty() {
            return Err(Error::InvalidConfiguration("no decoded format".into()));
        }

        for desc in &self.coded_fmts {
            desc.ops()?;

            if let Some(frmsize) = &desc.frmsize {
                if !frmsize.is_valid() {
                    return Err(Error::InvalidConfiguration(format!(
                        "coded format {} has an empty frame size range",
                        desc.fourcc
                    )));
                }
            }

            for ctrl in &desc.ctrls {
                ctrl.config.validate()?;
            }
        }
        Ok(())
    }

    pub fn coded_fmts(&self) -> &[CodedFormatDesc] {
        &self.coded_fmts
    }

    pub fn decoded_fmts(&self) -> &[DecodedFormatDesc] {
        &self.decoded_fmts
    }

    /// First coded format matching `fourcc`
    pub fn find_coded_fmt(&self, fourcc: FourCC) -> Option<&CodedFormatDesc> {
        self.coded_fmts.iter().find(|d| d.fourcc == fourcc)
    }

    /// Table index of the first coded format matching `fourcc`
    pub fn coded_fmt_index(&self, fourcc: FourCC) -> Option<usize> {
        self.coded_fmts.iter().position(|d| d.fourcc == fourcc)
    }

    /// First decoded format matching `fourcc`
    pub fn find_decoded_fmt(&self, fourcc: FourCC) -> Option<&DecodedFormatDesc> {
        self.decoded_fmts.iter().find(|d| d.fourcc == fourcc)
    }

    pub fn decoded_fmt_index(&self, fourcc: FourCC) -> Option<usize> {
        self.decoded_fmts.iter().position(|d| d.fourcc == fourcc)
    }

    /// Worst case number of controls a context may need: the sum over all
    /// coded formats.
    pub fn total_ctrls(&self) -> usize {
        self.coded_fmts.iter().map(|d| d.ctrls.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NopOps;

    impl CodedFormatOps for NopOps {
        fn run(&self, _ctx: &mut CodecContext) -> Result<(), Error> {
            Ok(())
        }
    }

    fn int_ctrl(id: u32, min: i64, max: i64, default: i64) -> ControlConfig {
        ControlConfig::new(
            ControlId(id),
            "int",
            ControlKind::Integer {
                min,
                max,
                step: 1,
                default,
            },
        )
    }

    fn caps_with(coded: CodedFormatDesc) -> CodecCaps {
        CodecCaps::new(vec![coded], vec![DecodedFormatDesc::new(FourCC::NV12)])
    }

    #[test]
    fn test_validate_ok() {
        let caps = caps_with(
            CodedFormatDesc::new(FourCC::H264_SLICE)
                .with_ctrls(vec![ControlDesc::new(int_ctrl(1, 0, 10, 5))])
                .with_ops(Arc::new(NopOps)),
        );
        caps.validate().unwrap();
        assert_eq!(caps.total_ctrls(), 1);
    }

    #[test]
    fn test_validate_empty_tables() {
        let caps = CodecCaps::new(vec![], vec![DecodedFormatDesc::new(FourCC::NV12)]);
        assert!(matches!(caps.validate(), Err(Error::InvalidConfiguration(_))));

        let caps = CodecCaps::new(
            vec![CodedFormatDesc::new(FourCC::H264).with_ops(Arc::new(NopOps))],
            vec![],
        );
        assert!(matches!(caps.validate(), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_validate_missing_ops() {
        let caps = caps_with(CodedFormatDesc::new(FourCC::H264));
        assert!(matches!(caps.validate(), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_validate_bad_ctrl() {
        let caps = caps_with(
            CodedFormatDesc::new(FourCC::H264)
                .with_ctrls(vec![ControlDesc::new(int_ctrl(1, 0, 10, 11))])
                .with_ops(Arc::new(NopOps)),
        );
        assert!(matches!(caps.validate(), Err(Error::InvalidConfiguration(_))));

        let menu = ControlConfig::new(
            ControlId(2),
            "menu",
            ControlKind::Menu {
                min: 0,
                max: 1,
                skip_mask: 0b01,
                default: 0,
            },
        );
        assert!(menu.validate().is_err());
    }

    #[test]
    fn test_lookup_first_match() {
        let caps = CodecCaps::new(
            vec![
                CodedFormatDesc::new(FourCC::H264_SLICE).with_ops(Arc::new(NopOps)),
                CodedFormatDesc::new(FourCC::VP8_FRAME).with_ops(Arc::new(NopOps)),
            ],
            vec![
                DecodedFormatDesc::new(FourCC::NV12).with_priv(Arc::new(7u32)),
                DecodedFormatDesc::new(FourCC::NV21),
            ],
        );
        assert_eq!(caps.coded_fmt_index(FourCC::VP8_FRAME), Some(1));
        assert!(caps.find_coded_fmt(FourCC::HEVC).is_none());
        assert_eq!(
            caps.find_decoded_fmt(FourCC::NV12).and_then(|d| d.priv_as::<u32>()),
            Some(&7)
        );
    }
}
