// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! H.264 stateless decoding helpers
//!
//! Control descriptors for the H.264 slice decoding interface and a run
//! object that gathers the per-frame parameters a decoder needs.

use crate::caps::{ControlConfig, ControlDesc, ControlId, ControlKind};
use crate::context::CodecContext;
use crate::job::JobRun;
use crate::Error;

const CID_MPEG_BASE: u32 = 0x0099_0900;

pub const CID_H264_SPS: ControlId = ControlId(CID_MPEG_BASE + 1000);
pub const CID_H264_PPS: ControlId = ControlId(CID_MPEG_BASE + 1001);
pub const CID_H264_SCALING_MATRIX: ControlId = ControlId(CID_MPEG_BASE + 1002);
pub const CID_H264_SLICE_PARAMS: ControlId = ControlId(CID_MPEG_BASE + 1003);
pub const CID_H264_DECODE_PARAMS: ControlId = ControlId(CID_MPEG_BASE + 1004);
pub const CID_H264_DECODE_MODE: ControlId = ControlId(CID_MPEG_BASE + 1005);

/// Payload sizes of the compound parameter controls, in bytes
pub const SPS_SIZE: usize = 1048;
pub const PPS_SIZE: usize = 12;
pub const SCALING_MATRIX_SIZE: usize = 480;
pub const SLICE_PARAMS_SIZE: usize = 1248;
pub const DECODE_PARAMS_SIZE: usize = 560;

/// One request per slice
pub const DECODE_MODE_SLICE_BASED: i64 = 0;
/// One request per frame
pub const DECODE_MODE_FRAME_BASED: i64 = 1;

fn param_ctrl(id: ControlId, name: &str, size: usize) -> ControlDesc {
    ControlDesc::new(ControlConfig::new(id, name, ControlKind::Compound { size }))
        .per_request(true)
        .mandatory(true)
}

pub fn decode_params_ctrl() -> ControlDesc {
    param_ctrl(CID_H264_DECODE_PARAMS, "H264 Decode Parameters", DECODE_PARAMS_SIZE)
}

pub fn slice_params_ctrl() -> ControlDesc {
    param_ctrl(CID_H264_SLICE_PARAMS, "H264 Slice Parameters", SLICE_PARAMS_SIZE)
}

pub fn sps_ctrl() -> ControlDesc {
    param_ctrl(CID_H264_SPS, "H264 Sequence Parameter Set", SPS_SIZE)
}

pub fn pps_ctrl() -> ControlDesc {
    param_ctrl(CID_H264_PPS, "H264 Picture Parameter Set", PPS_SIZE)
}

pub fn scaling_matrix_ctrl() -> ControlDesc {
    param_ctrl(CID_H264_SCALING_MATRIX, "H264 Scaling Matrix", SCALING_MATRIX_SIZE)
}

/// Decoding granularity menu. Bit `n` of `unsupported` hides mode `n`.
pub fn decode_mode_ctrl(unsupported: u64, default: i64) -> ControlDesc {
    ControlDesc::new(ControlConfig::new(
        CID_H264_DECODE_MODE,
        "H264 Decode Mode",
        ControlKind::Menu {
            min: DECODE_MODE_SLICE_BASED,
            max: DECODE_MODE_FRAME_BASED,
            skip_mask: unsupported,
            default,
        },
    ))
    .mandatory(true)
}

/// Full control set of an H.264 slice decoder
pub fn decoder_controls(unsupported_modes: u64, default_mode: i64) -> Vec<ControlDesc> {
    vec![
        decode_params_ctrl(),
        slice_params_ctrl(),
        sps_ctrl(),
        pps_ctrl(),
        scaling_matrix_ctrl(),
        decode_mode_ctrl(unsupported_modes, default_mode),
    ]
}

/// One H.264 decode job with the parameters it runs with
#[derive(Debug)]
#[must_use = "a decode run must be finished with postamble"]
pub struct H264DecodeRun {
    pub base: JobRun,
    pub decode_params: Option<Vec<u8>>,
    pub slice_params: Option<Vec<u8>>,
    pub sps: Option<Vec<u8>>,
    pub pps: Option<Vec<u8>>,
    pub scaling_matrix: Option<Vec<u8>>,
}

impl H264DecodeRun {
    /// Start a run and read back the parameter controls as the source
    /// request left them. Controls the codec does not register are `None`.
    pub fn preamble(ctx: &mut CodecContext) -> Result<H264DecodeRun, Error> {
        let base = ctx.run_preamble()?;
        let payload = |id| {
            ctx.ctrls()
                .value(id)
                .and_then(|v| v.as_bytes())
                .map(<[u8]>::to_vec)
        };

        Ok(H264DecodeRun {
            decode_params: payload(CID_H264_DECODE_PARAMS),
            slice_params: payload(CID_H264_SLICE_PARAMS),
            sps: payload(CID_H264_SPS),
            pps: payload(CID_H264_PPS),
            scaling_matrix: payload(CID_H264_SCALING_MATRIX),
            base,
        })
    }

    pub fn postamble(self, ctx: &mut CodecContext) {
        ctx.run_postamble(self.base);
    }
}
