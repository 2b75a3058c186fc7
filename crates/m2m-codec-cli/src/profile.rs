// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Device profiles
//!
//! A profile describes a codec the way a driver would: its type, the coded
//! and raw formats it handles, frame size limits and controls. The CLI
//! turns a profile into a [`CodecCaps`] table backed by virtual hardware.
//! Profiles are JSON files; two are built in.

use crate::error::CliError;
use crate::utils::parse_fourcc;
use m2m_codec::caps::{
    CodecCaps, CodedFormatDesc, CodedFormatOps, ControlConfig, ControlDesc, ControlId, ControlKind,
    DecodedFormatDesc,
};
use m2m_codec::codec::CodecType;
use m2m_codec::format::FrameSizeStepwise;
use m2m_codec::fourcc::FourCC;
use m2m_codec::h264;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

/// Name of the profile used when none is given
pub const DEFAULT_PROFILE: &str = "rkvdec";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileCodecType {
    Decoder,
    Encoder,
}

impl From<ProfileCodecType> for CodecType {
    fn from(t: ProfileCodecType) -> Self {
        match t {
            ProfileCodecType::Decoder => CodecType::Decoder,
            ProfileCodecType::Encoder => CodecType::Encoder,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    pub codec_type: ProfileCodecType,
    #[serde(default)]
    pub multiplanar: bool,
    pub coded_formats: Vec<CodedFormatProfile>,
    pub decoded_formats: Vec<String>,
    /// Time the virtual hardware spends on each job
    #[serde(default = "default_latency_us")]
    pub latency_us: u64,
}

fn default_latency_us() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodedFormatProfile {
    pub fourcc: String,
    #[serde(default)]
    pub requires_requests: bool,
    #[serde(default)]
    pub frame_size: Option<FrameSizeProfile>,
    #[serde(default)]
    pub controls: Vec<ControlProfile>,
    /// Register the stateless H.264 decoding controls
    #[serde(default)]
    pub h264_controls: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrameSizeProfile {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

impl From<FrameSizeProfile> for FrameSizeStepwise {
    fn from(p: FrameSizeProfile) -> Self {
        FrameSizeStepwise::new(
            p.min_width,
            p.max_width,
            p.step_width,
            p.min_height,
            p.max_height,
            p.step_height,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlProfile {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub per_request: bool,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(flatten)]
    pub kind: ControlKindProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlKindProfile {
    Integer {
        min: i64,
        max: i64,
        #[serde(default = "default_step")]
        step: u64,
        default: i64,
    },
    Boolean {
        #[serde(default)]
        default: bool,
    },
    Menu {
        min: i64,
        max: i64,
        #[serde(default)]
        skip_mask: u64,
        default: i64,
    },
    Compound {
        size: usize,
    },
}

fn default_step() -> u64 {
    1
}

impl From<&ControlKindProfile> for ControlKind {
    fn from(kind: &ControlKindProfile) -> Self {
        match *kind {
            ControlKindProfile::Integer {
                min,
                max,
                step,
                default,
            } => ControlKind::Integer {
                min,
                max,
                step,
                default,
            },
            ControlKindProfile::Boolean { default } => ControlKind::Boolean { default },
            ControlKindProfile::Menu {
                min,
                max,
                skip_mask,
                default,
            } => ControlKind::Menu {
                min,
                max,
                skip_mask,
                default,
            },
            ControlKindProfile::Compound { size } => ControlKind::Compound { size },
        }
    }
}

impl ControlProfile {
    fn to_desc(&self) -> ControlDesc {
        ControlDesc::new(ControlConfig::new(
            ControlId(self.id),
            self.name.clone(),
            ControlKind::from(&self.kind),
        ))
        .per_request(self.per_request)
        .mandatory(self.mandatory)
    }
}

impl DeviceProfile {
    /// Load a profile by built-in name or from a JSON file. `None` picks
    /// the default built-in profile.
    pub fn load(name_or_path: Option<&str>) -> Result<DeviceProfile, CliError> {
        let name_or_path = name_or_path.unwrap_or(DEFAULT_PROFILE);
        if let Some(profile) = DeviceProfile::builtin(name_or_path) {
            log::debug!("Using built-in profile {}", name_or_path);
            return Ok(profile);
        }
        DeviceProfile::from_file(Path::new(name_or_path))
    }

    pub fn from_file(path: &Path) -> Result<DeviceProfile, CliError> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CliError::ProfileNotFound(format!(
                "{} (built-in profiles: {})",
                path.display(),
                DeviceProfile::builtin_names().join(", ")
            )),
            _ => CliError::ProfileNotFound(format!("{}: {}", path.display(), e)),
        })?;

        let profile: DeviceProfile = serde_json::from_str(&text).map_err(|e| {
            CliError::InvalidArgs(format!("malformed profile {}: {}", path.display(), e))
        })?;
        log::debug!("Loaded profile {} from {}", profile.name, path.display());
        Ok(profile)
    }

    /// Built-in profiles: `rkvdec`, a stateless H.264 decoder, and `vepu`,
    /// a stateful H.264 encoder.
    pub fn builtin(name: &str) -> Option<DeviceProfile> {
        match name {
            "rkvdec" => Some(DeviceProfile {
                name: "rkvdec".into(),
                codec_type: ProfileCodecType::Decoder,
                multiplanar: true,
                coded_formats: vec![CodedFormatProfile {
                    fourcc: "S264".into(),
                    requires_requests: true,
                    frame_size: Some(FrameSizeProfile {
                        min_width: 48,
                        max_width: 3840,
                        step_width: 16,
                        min_height: 48,
                        max_height: 2160,
                        step_height: 16,
                    }),
                    controls: Vec::new(),
                    h264_controls: true,
                }],
                decoded_formats: vec!["NV12".into()],
                latency_us: 2000,
            }),
            "vepu" => Some(DeviceProfile {
                name: "vepu".into(),
                codec_type: ProfileCodecType::Encoder,
                multiplanar: false,
                coded_formats: vec![CodedFormatProfile {
                    fourcc: "H264".into(),
                    requires_requests: false,
                    frame_size: Some(FrameSizeProfile {
                        min_width: 96,
                        max_width: 1920,
                        step_width: 16,
                        min_height: 96,
                        max_height: 1088,
                        step_height: 16,
                    }),
                    controls: vec![ControlProfile {
                        id: 0x0099_09cf,
                        name: "Video Bitrate".into(),
                        per_request: false,
                        mandatory: false,
                        kind: ControlKindProfile::Integer {
                            min: 10_000,
                            max: 60_000_000,
                            step: 1,
                            default: 4_000_000,
                        },
                    }],
                    h264_controls: false,
                }],
                decoded_formats: vec!["NV12".into(), "YU12".into()],
                latency_us: 5000,
            }),
            _ => None,
        }
    }

    pub fn builtin_names() -> &'static [&'static str] {
        &["rkvdec", "vepu"]
    }

    pub fn codec_type(&self) -> CodecType {
        self.codec_type.into()
    }

    /// Build the capability table, attaching `ops` to every coded format
    pub fn to_caps<F>(&self, mut ops: F) -> Result<CodecCaps, CliError>
    where
        F: FnMut(FourCC) -> Arc<dyn CodedFormatOps>,
    {
        let mut coded = Vec::with_capacity(self.coded_formats.len());
        for fmt in &self.coded_formats {
            let fourcc = parse_fourcc(&fmt.fourcc)?;
            let mut ctrls: Vec<ControlDesc> = fmt.controls.iter().map(ControlProfile::to_desc).collect();
            if fmt.h264_controls {
                ctrls.extend(h264::decoder_controls(0, h264::DECODE_MODE_FRAME_BASED));
            }

            let mut desc = CodedFormatDesc::new(fourcc)
                .with_requires_requests(fmt.requires_requests)
                .with_ctrls(ctrls)
                .with_ops(ops(fourcc));
            if let Some(frmsize) = fmt.frame_size {
                desc = desc.with_frmsize(frmsize.into());
            }
            coded.push(desc);
        }

        let decoded = self
            .decoded_formats
            .iter()
            .map(|s| parse_fourcc(s).map(DecodedFormatDesc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CodecCaps::new(coded, decoded))
    }

    /// Whether any coded format needs media requests
    pub fn uses_requests(&self) -> bool {
        self.coded_formats.iter().any(|f| f.requires_requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m2m_codec::context::CodecContext;

    struct Nop;

    impl CodedFormatOps for Nop {
        fn run(&self, _ctx: &mut CodecContext) -> Result<(), m2m_codec::Error> {
            Ok(())
        }
    }

    fn nop(_: FourCC) -> Arc<dyn CodedFormatOps> {
        Arc::new(Nop)
    }

    #[test]
    fn test_builtin_profiles_build() {
        for name in DeviceProfile::builtin_names() {
            let profile = DeviceProfile::builtin(name).unwrap();
            let caps = profile.to_caps(nop).unwrap();
            caps.validate().unwrap();
        }
    }

    #[test]
    fn test_rkvdec_caps() {
        let profile = DeviceProfile::load(None).unwrap();
        assert_eq!(profile.codec_type(), CodecType::Decoder);

        let caps = profile.to_caps(nop).unwrap();
        let h264 = caps.find_coded_fmt(FourCC::H264_SLICE).unwrap();
        assert!(h264.requires_requests);
        assert_eq!(h264.ctrls.len(), 6);
        assert_eq!(
            h264.frmsize,
            Some(FrameSizeStepwise::new(48, 3840, 16, 48, 2160, 16))
        );
        assert!(caps.find_decoded_fmt(FourCC::NV12).is_some());
    }

    #[test]
    fn test_parse_json_profile() {
        let json = r#"{
            "name": "mini",
            "codec_type": "decoder",
            "coded_formats": [{
                "fourcc": "VP8F",
                "frame_size": {
                    "min_width": 16, "max_width": 1920, "step_width": 16,
                    "min_height": 16, "max_height": 1080, "step_height": 16
                },
                "controls": [
                    {"id": 10, "name": "Frame", "type": "compound", "size": 64,
                     "per_request": true, "mandatory": true},
                    {"id": 11, "name": "Mode", "type": "menu", "min": 0, "max": 2, "default": 1}
                ]
            }],
            "decoded_formats": ["NV12"]
        }"#;

        let profile: DeviceProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.latency_us, 1000);
        assert!(!profile.multiplanar);

        let caps = profile.to_caps(nop).unwrap();
        let vp8 = caps.find_coded_fmt(FourCC::VP8_FRAME).unwrap();
        assert_eq!(vp8.required_ctrls().count(), 1);
        assert_eq!(
            vp8.ctrls[1].config.kind,
            ControlKind::Menu {
                min: 0,
                max: 2,
                skip_mask: 0,
                default: 1
            }
        );
    }

    #[test]
    fn test_bad_fourcc_rejected() {
        let mut profile = DeviceProfile::builtin("vepu").unwrap();
        profile.decoded_formats.push("NV1".into());
        assert!(matches!(profile.to_caps(nop), Err(CliError::InvalidArgs(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = DeviceProfile::load(Some("/nonexistent/profile.json")).unwrap_err();
        assert!(matches!(err, CliError::ProfileNotFound(_)));
    }
}
