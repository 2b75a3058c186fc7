// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// Adapted from https://docs.rs/crate/four-cc/latest, little-endian packing as
// used by V4L2 pixel formats.
#![forbid(unsafe_code)]

use core::{fmt, result::Result, str::FromStr};

use crate::Error;

/// Four character code identifying a pixel or bitstream format.
///
/// The packed `u32` form matches `v4l2_fourcc()`: the first character sits in
/// the least significant byte regardless of host endianness.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// H.264 elementary stream with start codes
    pub const H264: FourCC = FourCC(*b"H264");
    /// H.264 parsed slices, decoded with per-request controls
    pub const H264_SLICE: FourCC = FourCC(*b"S264");
    /// HEVC elementary stream
    pub const HEVC: FourCC = FourCC(*b"HEVC");
    /// HEVC parsed slices
    pub const HEVC_SLICE: FourCC = FourCC(*b"S265");
    /// VP8 parsed frames
    pub const VP8_FRAME: FourCC = FourCC(*b"VP8F");
    /// MPEG-2 parsed slices
    pub const MPEG2_SLICE: FourCC = FourCC(*b"MG2S");
    /// Motion JPEG
    pub const MJPEG: FourCC = FourCC(*b"MJPG");

    /// Y/CbCr 4:2:0, luma plane followed by interleaved CbCr
    pub const NV12: FourCC = FourCC(*b"NV12");
    /// Y/CrCb 4:2:0, luma plane followed by interleaved CrCb
    pub const NV21: FourCC = FourCC(*b"NV21");
    /// Y/CbCr 4:2:2 semi-planar
    pub const NV16: FourCC = FourCC(*b"NV16");
    /// Y/CrCb 4:2:2 semi-planar
    pub const NV61: FourCC = FourCC(*b"NV61");
    /// NV12 with luma and chroma in separate memory planes
    pub const NV12M: FourCC = FourCC(*b"NM12");
    /// NV21 with luma and chroma in separate memory planes
    pub const NV21M: FourCC = FourCC(*b"NM21");
    /// Y/Cb/Cr 4:2:0 fully planar
    pub const YUV420: FourCC = FourCC(*b"YU12");
    /// Y/Cr/Cb 4:2:0 fully planar
    pub const YVU420: FourCC = FourCC(*b"YV12");
    /// YUV420 with each component in its own memory plane
    pub const YUV420M: FourCC = FourCC(*b"YM12");
    /// Y/Cb/Cr 4:2:2 fully planar
    pub const YUV422P: FourCC = FourCC(*b"422P");
    /// Packed YUV 4:2:2, Y0 Cb Y1 Cr
    pub const YUYV: FourCC = FourCC(*b"YUYV");
    /// Packed YUV 4:2:2, Cb Y0 Cr Y1
    pub const UYVY: FourCC = FourCC(*b"UYVY");
    /// 24-bit RGB
    pub const RGB24: FourCC = FourCC(*b"RGB3");
    /// 24-bit BGR
    pub const BGR24: FourCC = FourCC(*b"BGR3");
    /// 32-bit XRGB, padding byte first
    pub const XRGB32: FourCC = FourCC(*b"BX24");
    /// 8-bit greyscale
    pub const GREY: FourCC = FourCC(*b"GREY");

    /// Create a fourcc from its four characters
    pub const fn new(code: &[u8; 4]) -> FourCC {
        FourCC(*code)
    }

    /// Unpack a V4L2 style `u32` fourcc
    pub const fn from_u32(val: u32) -> FourCC {
        FourCC([
            (val & 0xff) as u8,
            (val >> 8 & 0xff) as u8,
            (val >> 16 & 0xff) as u8,
            (val >> 24 & 0xff) as u8,
        ])
    }

    /// Pack into a V4L2 style `u32` fourcc
    pub const fn to_u32(self) -> u32 {
        (self.0[3] as u32) << 24
            | (self.0[2] as u32) << 16
            | (self.0[1] as u32) << 8
            | (self.0[0] as u32)
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(buf: &[u8; 4]) -> FourCC {
        FourCC(*buf)
    }
}

impl From<u32> for FourCC {
    fn from(val: u32) -> FourCC {
        FourCC::from_u32(val)
    }
}

impl From<FourCC> for u32 {
    fn from(val: FourCC) -> Self {
        val.to_u32()
    }
}

impl FromStr for FourCC {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err(Error::InvalidArgument(format!(
                "fourcc must be exactly 4 characters: {:?}",
                s
            )));
        }
        Ok(FourCC([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match core::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => {
                // Returning fmt::Error would make format!() panic, escape instead
                let b = &self.0;
                f.write_fmt(format_args!(
                    "{}{}{}{}",
                    core::ascii::escape_default(b[0]),
                    core::ascii::escape_default(b[1]),
                    core::ascii::escape_default(b[2]),
                    core::ascii::escape_default(b[3])
                ))
            }
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("FourCC")
            .field(&format_args!("{}", self))
            .finish()
    }
}
