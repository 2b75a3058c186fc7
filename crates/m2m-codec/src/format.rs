// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Negotiated format description
//!
//! [`PixFormat`] is the single format object exchanged on both queues. It
//! covers the single-planar and the multi-planar buffer APIs: single-planar
//! formats always carry exactly one [`PlaneFormat`] holding every component,
//! multi-planar formats carry one entry per memory plane.
//!
//! Raw formats get their line pitch and plane sizes derived from the
//! [`PixelFormatInfo`] table through [`fill_pixfmt`] and [`fill_pixfmt_mp`].
//! Coded formats have no intrinsic layout; their buffer size is chosen by the
//! coded format's `adjust_fmt` hook.

use std::fmt;

use crate::fourcc::FourCC;
use crate::Error;

/// Maximum number of memory planes per buffer
pub const MAX_PLANES: usize = 8;

/// Queue direction, seen from the application
///
/// The output queue carries data into the device, the capture queue carries
/// results out of it. For a decoder the output queue holds the coded format;
/// for an encoder it holds the decoded format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Application to device
    Output,
    /// Device to application
    Capture,
}

impl Direction {
    /// The other queue of the pair
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Output => Direction::Capture,
            Direction::Capture => Direction::Output,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Output => write!(f, "output"),
            Direction::Capture => write!(f, "capture"),
        }
    }
}

/// Buffer type of a queue or format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufType {
    /// Single-planar capture
    VideoCapture,
    /// Single-planar output
    VideoOutput,
    /// Multi-planar capture
    VideoCaptureMplane,
    /// Multi-planar output
    VideoOutputMplane,
}

impl BufType {
    /// Buffer type for a direction and planarity
    pub fn new(direction: Direction, multiplanar: bool) -> BufType {
        match (direction, multiplanar) {
            (Direction::Output, false) => BufType::VideoOutput,
            (Direction::Output, true) => BufType::VideoOutputMplane,
            (Direction::Capture, false) => BufType::VideoCapture,
            (Direction::Capture, true) => BufType::VideoCaptureMplane,
        }
    }

    /// Whether buffers of this type flow from the application to the device
    pub fn is_output(self) -> bool {
        matches!(self, BufType::VideoOutput | BufType::VideoOutputMplane)
    }

    /// Whether this type uses the multi-planar API
    pub fn is_multiplanar(self) -> bool {
        matches!(
            self,
            BufType::VideoCaptureMplane | BufType::VideoOutputMplane
        )
    }

    /// Direction of this buffer type
    pub fn direction(self) -> Direction {
        if self.is_output() {
            Direction::Output
        } else {
            Direction::Capture
        }
    }
}

impl fmt::Display for BufType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.direction())?;
        if self.is_multiplanar() {
            write!(f, " (mplane)")?;
        }
        Ok(())
    }
}

/// Field order of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Field {
    /// Driver picks
    Any,
    /// Progressive
    #[default]
    None,
    /// Top field only
    Top,
    /// Bottom field only
    Bottom,
    /// Both fields interleaved
    Interlaced,
    /// Both fields sequential, top first
    SeqTb,
    /// Both fields sequential, bottom first
    SeqBt,
    /// Alternating fields in separate buffers
    Alternate,
    /// Interleaved, top field first in time
    InterlacedTb,
    /// Interleaved, bottom field first in time
    InterlacedBt,
}

/// Colorspace (chromaticities and default transfer/encoding)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Colorspace {
    #[default]
    Default,
    Smpte170m,
    Smpte240m,
    Rec709,
    Bt878,
    SysM470,
    Bt470Bg,
    Jpeg,
    Srgb,
    OpRgb,
    Bt2020,
    Raw,
    DciP3,
}

/// Transfer function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum XferFunc {
    #[default]
    Default,
    Rec709,
    Srgb,
    OpRgb,
    Smpte240m,
    None,
    DciP3,
    Smpte2084,
}

/// Y'CbCr encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum YcbcrEncoding {
    #[default]
    Default,
    Bt601,
    Rec709,
    Xv601,
    Xv709,
    Sycc,
    Bt2020,
    Bt2020ConstLum,
    Smpte240m,
}

/// Quantization range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quantization {
    #[default]
    Default,
    FullRange,
    LimRange,
}

/// Layout of one memory plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneFormat {
    /// Distance in bytes between two lines
    pub bytesperline: u32,
    /// Minimum buffer size in bytes for this plane
    pub sizeimage: u32,
}

/// Format of the frames carried by a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixFormat {
    /// Queue this format applies to
    pub buf_type: BufType,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel or bitstream format
    pub pixelformat: FourCC,
    /// Field order
    pub field: Field,
    pub colorspace: Colorspace,
    pub xfer_func: XferFunc,
    pub ycbcr_enc: YcbcrEncoding,
    pub quantization: Quantization,
    /// Number of valid entries in `plane_fmt`
    pub num_planes: u8,
    pub plane_fmt: [PlaneFormat; MAX_PLANES],
}

impl PixFormat {
    /// Freshly reset format: progressive, JPEG colorspace, default
    /// transfer function, encoding and quantization, one empty plane.
    pub fn new(buf_type: BufType, pixelformat: FourCC) -> PixFormat {
        PixFormat {
            buf_type,
            width: 0,
            height: 0,
            pixelformat,
            field: Field::None,
            colorspace: Colorspace::Jpeg,
            xfer_func: XferFunc::Default,
            ycbcr_enc: YcbcrEncoding::Default,
            quantization: Quantization::Default,
            num_planes: 1,
            plane_fmt: [PlaneFormat::default(); MAX_PLANES],
        }
    }

    /// Builder style size setter
    pub fn with_size(mut self, width: u32, height: u32) -> PixFormat {
        self.width = width;
        self.height = height;
        self
    }

    /// Valid plane layouts
    pub fn planes(&self) -> &[PlaneFormat] {
        let n = (self.num_planes as usize).min(MAX_PLANES);
        &self.plane_fmt[..n]
    }

    /// Number of planes a buffer of this format carries. Single-planar
    /// formats always use exactly one.
    pub fn plane_count(&self) -> usize {
        if self.buf_type.is_multiplanar() {
            (self.num_planes as usize).min(MAX_PLANES)
        } else {
            1
        }
    }

    /// Required size of plane `index`
    pub fn plane_size(&self, index: usize) -> u32 {
        self.plane_fmt.get(index).map_or(0, |p| p.sizeimage)
    }

    /// Copy colorspace, transfer function, encoding and quantization from
    /// another format.
    pub fn copy_colorimetry(&mut self, other: &PixFormat) {
        self.colorspace = other.colorspace;
        self.xfer_func = other.xfer_func;
        self.ycbcr_enc = other.ycbcr_enc;
        self.quantization = other.quantization;
    }
}

impl fmt::Display for PixFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}x{}", self.pixelformat, self.width, self.height)?;
        for (i, plane) in self.planes().iter().enumerate() {
            write!(
                f,
                " [{}: {}B/line {}B]",
                i, plane.bytesperline, plane.sizeimage
            )?;
        }
        Ok(())
    }
}

/// Stepwise frame size constraint of a coded format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSizeStepwise {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

impl FrameSizeStepwise {
    pub const fn new(
        min_width: u32,
        max_width: u32,
        step_width: u32,
        min_height: u32,
        max_height: u32,
        step_height: u32,
    ) -> FrameSizeStepwise {
        FrameSizeStepwise {
            min_width,
            max_width,
            step_width,
            min_height,
            max_height,
            step_height,
        }
    }

    /// Force a size into the constraint.
    ///
    /// Each dimension is clamped into `[min, max]` then rounded up to the
    /// next step counted from `min`. A step that would overshoot `max` is
    /// dropped, so the result never leaves the bounds.
    pub fn apply(&self, width: &mut u32, height: &mut u32) {
        *width = clamp_step(*width, self.min_width, self.max_width, self.step_width);
        *height = clamp_step(*height, self.min_height, self.max_height, self.step_height);
    }

    /// Whether a size satisfies the constraint as-is
    pub fn contains(&self, width: u32, height: u32) -> bool {
        let (mut w, mut h) = (width, height);
        self.apply(&mut w, &mut h);
        w == width && h == height
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.min_width <= self.max_width && self.min_height <= self.max_height
    }
}

impl fmt::Display for FrameSizeStepwise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} - {}x{} (step {}x{})",
            self.min_width,
            self.min_height,
            self.max_width,
            self.max_height,
            self.step_width,
            self.step_height
        )
    }
}

fn clamp_step(value: u32, min: u32, max: u32, step: u32) -> u32 {
    let value = value.clamp(min, max.max(min));
    if step <= 1 {
        return value;
    }

    let offset = value - min;
    let rounded = min.saturating_add(offset.div_ceil(step).saturating_mul(step));
    if rounded > max {
        rounded.saturating_sub(step).max(min)
    } else {
        rounded
    }
}

/// Memory layout description of a raw pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormatInfo {
    pub format: FourCC,
    /// Number of memory planes a buffer is split into
    pub mem_planes: u8,
    /// Number of component planes (luma, chroma...)
    pub comp_planes: u8,
    /// Bytes per pixel of each component plane
    pub bpp: [u8; 4],
    /// Horizontal chroma subsampling
    pub hdiv: u8,
    /// Vertical chroma subsampling
    pub vdiv: u8,
}

const fn info(
    format: FourCC,
    mem_planes: u8,
    comp_planes: u8,
    bpp: [u8; 4],
    hdiv: u8,
    vdiv: u8,
) -> PixelFormatInfo {
    PixelFormatInfo {
        format,
        mem_planes,
        comp_planes,
        bpp,
        hdiv,
        vdiv,
    }
}

static FORMAT_INFO: &[PixelFormatInfo] = &[
    info(FourCC::RGB24, 1, 1, [3, 0, 0, 0], 1, 1),
    info(FourCC::BGR24, 1, 1, [3, 0, 0, 0], 1, 1),
    info(FourCC::XRGB32, 1, 1, [4, 0, 0, 0], 1, 1),
    info(FourCC::GREY, 1, 1, [1, 0, 0, 0], 1, 1),
    info(FourCC::YUYV, 1, 1, [2, 0, 0, 0], 2, 1),
    info(FourCC::UYVY, 1, 1, [2, 0, 0, 0], 2, 1),
    info(FourCC::YUV420, 1, 3, [1, 1, 1, 0], 2, 2),
    info(FourCC::YVU420, 1, 3, [1, 1, 1, 0], 2, 2),
    info(FourCC::YUV422P, 1, 3, [1, 1, 1, 0], 2, 1),
    info(FourCC::NV12, 1, 2, [1, 2, 0, 0], 2, 2),
    info(FourCC::NV21, 1, 2, [1, 2, 0, 0], 2, 2),
    info(FourCC::NV16, 1, 2, [1, 2, 0, 0], 2, 1),
    info(FourCC::NV61, 1, 2, [1, 2, 0, 0], 2, 1),
    info(FourCC::NV12M, 2, 2, [1, 2, 0, 0], 2, 2),
    info(FourCC::NV21M, 2, 2, [1, 2, 0, 0], 2, 2),
    info(FourCC::YUV420M, 3, 3, [1, 1, 1, 0], 2, 2),
];

impl PixelFormatInfo {
    /// Look a raw format up. Coded formats have no entry.
    pub fn lookup(fourcc: FourCC) -> Option<&'static PixelFormatInfo> {
        FORMAT_INFO.iter().find(|info| info.format == fourcc)
    }

    fn subsampling(&self, comp: usize) -> (u32, u32) {
        if comp == 0 || comp == 3 {
            (1, 1)
        } else {
            (self.hdiv as u32, self.vdiv as u32)
        }
    }

    fn comp_size(&self, comp: usize, width: u32, height: u32) -> Result<u32, Error> {
        let (hdiv, vdiv) = self.subsampling(comp);
        (self.bpp[comp] as u32)
            .checked_mul(width.div_ceil(hdiv))
            .and_then(|line| line.checked_mul(height.div_ceil(vdiv)))
            .ok_or_else(|| too_large(self.format, width, height))
    }

    /// Pitch and size of a single memory plane holding every component.
    fn packed_plane(&self, width: u32, height: u32) -> Result<PlaneFormat, Error> {
        let bytesperline = width
            .checked_mul(self.bpp[0] as u32)
            .ok_or_else(|| too_large(self.format, width, height))?;
        let mut sizeimage = 0u32;
        for comp in 0..self.comp_planes as usize {
            sizeimage = sizeimage
                .checked_add(self.comp_size(comp, width, height)?)
                .ok_or_else(|| too_large(self.format, width, height))?;
        }
        Ok(PlaneFormat {
            bytesperline,
            sizeimage,
        })
    }
}

fn too_large(fourcc: FourCC, width: u32, height: u32) -> Error {
    Error::InvalidArgument(format!("{fourcc} {width}x{height} exceeds the buffer size range"))
}

/// Fill a single-planar format: every component lands in one memory plane.
///
/// Fails with [`Error::UnsupportedFormat`] for formats without a layout
/// description and [`Error::InvalidArgument`] for formats that need several
/// memory planes.
pub fn fill_pixfmt(f: &mut PixFormat, fourcc: FourCC, width: u32, height: u32) -> Result<(), Error> {
    let info = PixelFormatInfo::lookup(fourcc).ok_or(Error::UnsupportedFormat(fourcc))?;
    if info.mem_planes != 1 {
        return Err(Error::InvalidArgument(format!(
            "{} needs {} memory planes",
            fourcc, info.mem_planes
        )));
    }

    let plane = info.packed_plane(width, height)?;
    f.pixelformat = fourcc;
    f.width = width;
    f.height = height;
    f.num_planes = 1;
    f.plane_fmt = [PlaneFormat::default(); MAX_PLANES];
    f.plane_fmt[0] = plane;
    Ok(())
}

/// Fill a multi-planar format, one [`PlaneFormat`] per memory plane.
pub fn fill_pixfmt_mp(
    f: &mut PixFormat,
    fourcc: FourCC,
    width: u32,
    height: u32,
) -> Result<(), Error> {
    let info = PixelFormatInfo::lookup(fourcc).ok_or(Error::UnsupportedFormat(fourcc))?;

    let mut planes = [PlaneFormat::default(); MAX_PLANES];
    if info.mem_planes == 1 {
        planes[0] = info.packed_plane(width, height)?;
    } else {
        for (comp, plane) in planes.iter_mut().enumerate().take(info.comp_planes as usize) {
            let (hdiv, vdiv) = info.subsampling(comp);
            let bytesperline = (info.bpp[comp] as u32)
                .checked_mul(width.div_ceil(hdiv))
                .ok_or_else(|| too_large(fourcc, width, height))?;
            let sizeimage = bytesperline
                .checked_mul(height.div_ceil(vdiv))
                .ok_or_else(|| too_large(fourcc, width, height))?;
            *plane = PlaneFormat {
                bytesperline,
                sizeimage,
            };
        }
    }

    f.pixelformat = fourcc;
    f.width = width;
    f.height = height;
    f.num_planes = info.mem_planes;
    f.plane_fmt = planes;
    Ok(())
}

/// Fill `f` using the API matching its buffer type
pub fn fill_format(f: &mut PixFormat, fourcc: FourCC, width: u32, height: u32) -> Result<(), Error> {
    if f.buf_type.is_multiplanar() {
        fill_pixfmt_mp(f, fourcc, width, height)
    } else {
        fill_pixfmt(f, fourcc, width, height)
    }
}
