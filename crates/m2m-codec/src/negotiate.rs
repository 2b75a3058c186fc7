// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Format negotiation
//!
//! The coded end is authoritative: its frame size constraint bounds the
//! decoded end and committing it pushes colorimetry onto the decoded format.

use crate::caps::CodecCaps;
use crate::context::CodecContext;
use crate::format::{fill_format, BufType, Direction, Field, FrameSizeStepwise, PixFormat};
use crate::fourcc::FourCC;
use crate::Error;

impl CodecContext {
    /// Reset the coded format to the first coded format of the codec, at its
    /// minimum frame size.
    pub fn reset_coded_fmt(&mut self) -> Result<(), Error> {
        let codec = self.codec.clone();
        let desc = codec
            .caps()
            .coded_fmts()
            .first()
            .ok_or_else(|| Error::InvalidConfiguration("no coded formats".into()))?;

        let buf_type = BufType::new(self.codec_type().coded_direction(), codec.is_multiplanar());
        let mut f = PixFormat::new(buf_type, desc.fourcc);
        if let Some(frmsize) = &desc.frmsize {
            f.width = frmsize.min_width;
            f.height = frmsize.min_height;
        }

        desc.ops()?.adjust_fmt(self, &mut f)?;
        self.coded_desc = Some(0);
        self.coded_fmt = f;

        log::debug!("{}: coded format reset to {}", self.id, self.coded_fmt);
        Ok(())
    }

    /// Reset the decoded format to the first decoded format of the codec,
    /// sized by the active coded format's constraint.
    pub fn reset_decoded_fmt(&mut self) -> Result<(), Error> {
        if self.coded_desc.is_none() {
            self.reset_coded_fmt()?;
        }

        let codec = self.codec.clone();
        let desc = codec
            .caps()
            .decoded_fmts()
            .first()
            .ok_or_else(|| Error::InvalidConfiguration("no decoded formats".into()))?;

        let buf_type = BufType::new(self.codec_type().decoded_direction(), codec.is_multiplanar());
        let mut f = PixFormat::new(buf_type, desc.fourcc);
        if let Some(frmsize) = self.active_frmsize() {
            f.width = frmsize.min_width;
            f.height = frmsize.min_height;
        }
        let (width, height) = (f.width, f.height);
        fill_format(&mut f, desc.fourcc, width, height)?;

        self.decoded_fmt = f;
        self.decoded_desc = Some(0);

        log::debug!("{}: decoded format reset to {}", self.id, self.decoded_fmt);
        Ok(())
    }

    /// Fourcc of the `index`th format on the `dir` queue
    pub fn enum_fmt(&self, dir: Direction, index: usize) -> Result<FourCC, Error> {
        let caps = self.codec.caps();
        let fourcc = if self.is_coded_queue(dir) {
            caps.coded_fmts().get(index).map(|d| d.fourcc)
        } else {
            caps.decoded_fmts().get(index).map(|d| d.fourcc)
        };
        fourcc.ok_or_else(|| {
            Error::InvalidArgument(format!("{} format index {} out of range", dir, index))
        })
    }

    /// Current format of the `dir` queue
    pub fn g_fmt(&self, dir: Direction) -> &PixFormat {
        if self.is_coded_queue(dir) {
            &self.coded_fmt
        } else {
            &self.decoded_fmt
        }
    }

    /// Adjust `f` to the closest format the codec accepts on the queue
    /// named by its buffer type. `f` is updated in place.
    pub fn try_fmt(&self, f: &mut PixFormat) -> Result<(), Error> {
        if f.buf_type.is_multiplanar() != self.codec.is_multiplanar() {
            return Err(Error::InvalidArgument(format!(
                "{} buffers not supported by {}",
                f.buf_type,
                self.codec.name()
            )));
        }

        if self.is_coded_queue(f.buf_type.direction()) {
            self.try_coded_fmt(f)
        } else {
            self.try_decoded_fmt(f)
        }
    }

    fn try_coded_fmt(&self, f: &mut PixFormat) -> Result<(), Error> {
        let desc = self
            .codec
            .caps()
            .find_coded_fmt(f.pixelformat)
            .ok_or(Error::UnsupportedFormat(f.pixelformat))?;

        if let Some(frmsize) = &desc.frmsize {
            frmsize.apply(&mut f.width, &mut f.height);
        }
        f.field = Field::None;
        // Coded data is never split across memory planes.
        f.num_planes = 1;

        desc.ops()?.adjust_fmt(self, f)
    }

    fn try_decoded_fmt(&self, f: &mut PixFormat) -> Result<(), Error> {
        if self.coded_desc.is_none() {
            log::error!("{}: no coded format resolved", self.id);
            return Err(Error::InvalidArgument("no coded format resolved".into()));
        }

        let fourcc = f.pixelformat;
        if self.codec.caps().find_decoded_fmt(fourcc).is_none() {
            return Err(Error::UnsupportedFormat(fourcc));
        }

        if let Some(frmsize) = self.active_frmsize() {
            frmsize.apply(&mut f.width, &mut f.height);
        }
        let (width, height) = (f.width, f.height);
        fill_format(f, fourcc, width, height)?;
        f.field = Field::None;
        Ok(())
    }

    /// Try then commit a format on the queue named by its buffer type.
    ///
    /// Refused with [`Error::Busy`] while the queue has buffers allocated.
    /// Committing the coded end selects the matching coded descriptor,
    /// updates the OUTPUT queue's request requirement and pushes colorimetry
    /// and the new size constraint onto the decoded format.
    pub fn s_fmt(&mut self, f: &mut PixFormat) -> Result<(), Error> {
        let dir = f.buf_type.direction();
        if self.queue(dir).is_busy() {
            return Err(Error::Busy(f.buf_type));
        }

        self.try_fmt(f)?;

        if !self.is_coded_queue(dir) {
            self.decoded_desc = self.codec.caps().decoded_fmt_index(f.pixelformat);
            self.decoded_fmt = f.clone();
            log::debug!("{}: decoded format set to {}", self.id, self.decoded_fmt);
            return Ok(());
        }

        let codec = self.codec.clone();
        let index = codec
            .caps()
            .coded_fmt_index(f.pixelformat)
            .ok_or(Error::UnsupportedFormat(f.pixelformat))?;
        let desc = &codec.caps().coded_fmts()[index];

        let mut decoded = self.decoded_fmt.clone();
        decoded.copy_colorimetry(f);
        if let Some(frmsize) = &desc.frmsize {
            frmsize.apply(&mut decoded.width, &mut decoded.height);
            let (fourcc, width, height) = (decoded.pixelformat, decoded.width, decoded.height);
            fill_format(&mut decoded, fourcc, width, height)?;
        }

        self.coded_desc = Some(index);
        self.coded_fmt = f.clone();
        self.decoded_fmt = decoded;
        self.out_q.set_requires_requests(desc.requires_requests);

        log::debug!(
            "{}: coded format set to {}, decoded now {}",
            self.id,
            self.coded_fmt,
            self.decoded_fmt
        );
        Ok(())
    }

    /// Frame size constraint of a coded format. Only index 0 exists.
    pub fn enum_framesizes(&self, fourcc: FourCC, index: u32) -> Result<FrameSizeStepwise, Error> {
        enum_framesizes(self.codec.caps(), fourcc, index)
    }

    fn active_frmsize(&self) -> Option<FrameSizeStepwise> {
        self.coded_fmt_desc().and_then(|d| d.frmsize)
    }
}

fn enum_framesizes(caps: &CodecCaps, fourcc: FourCC, index: u32) -> Result<FrameSizeStepwise, Error> {
    if index != 0 {
        return Err(Error::InvalidArgument(format!(
            "frame size index {} (only 0 is valid)",
            index
        )));
    }

    let desc = caps
        .find_coded_fmt(fourcc)
        .ok_or_else(|| Error::NotFound(format!("coded format {}", fourcc)))?;
    desc.frmsize
        .ok_or_else(|| Error::NotFound(format!("frame size constraint for {}", fourcc)))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::caps::{CodedFormatDesc, CodedFormatOps, DecodedFormatDesc};
    use crate::codec::{CodecInstance, CodecOps, CodecType};
    use crate::format::Colorspace;
    use crate::queue::QueueConfig;
    use crate::scheduler::M2mDevice;

    /// Coded data is sized for a 4:2:0 frame at 1.5 bytes per pixel
    struct Coded;

    impl CodedFormatOps for Coded {
        fn adjust_fmt(&self, _ctx: &CodecContext, f: &mut PixFormat) -> Result<(), Error> {
            f.plane_fmt[0].bytesperline = 0;
            let pixels = f.width.saturating_mul(f.height);
            f.plane_fmt[0].sizeimage = (pixels.saturating_mul(3) / 2).max(4096);
            Ok(())
        }

        fn run(&self, _ctx: &mut CodecContext) -> Result<(), Error> {
            Ok(())
        }
    }

    /// Refuses every format once `fail` is raised
    struct Flaky {
        fail: Arc<AtomicBool>,
    }

    impl CodedFormatOps for Flaky {
        fn adjust_fmt(&self, _ctx: &CodecContext, f: &mut PixFormat) -> Result<(), Error> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::InvalidArgument("format refused".into()));
            }
            f.plane_fmt[0].sizeimage = 4096;
            Ok(())
        }

        fn run(&self, _ctx: &mut CodecContext) -> Result<(), Error> {
            Ok(())
        }
    }

    struct Ops(bool);

    impl CodecOps for Ops {
        fn queue_init(&self, _src: &mut QueueConfig, _dst: &mut QueueConfig) -> Result<(), Error> {
            Ok(())
        }

        fn multiplanar(&self) -> bool {
            self.0
        }
    }

    fn context(codec_type: CodecType, mplane: bool) -> CodecContext {
        let caps = CodecCaps::new(
            vec![
                CodedFormatDesc::new(FourCC::H264_SLICE)
                    .with_requires_requests(true)
                    .with_frmsize(FrameSizeStepwise::new(64, 1920, 16, 64, 1088, 16))
                    .with_ops(Arc::new(Coded)),
                CodedFormatDesc::new(FourCC::VP8_FRAME).with_ops(Arc::new(Coded)),
            ],
            vec![
                DecodedFormatDesc::new(FourCC::NV12),
                DecodedFormatDesc::new(FourCC::YUV420M),
                DecodedFormatDesc::new(FourCC::XRGB32),
            ],
        );
        let codec =
            CodecInstance::new(codec_type, M2mDevice::new(), caps, Arc::new(Ops(mplane)), "neg").unwrap();
        CodecContext::new(&codec).unwrap()
    }

    #[test]
    fn test_defaults() {
        let ctx = context(CodecType::Decoder, false);
        let coded = ctx.g_fmt(Direction::Output);
        assert_eq!(coded.pixelformat, FourCC::H264_SLICE);
        assert_eq!((coded.width, coded.height), (64, 64));
        assert_eq!(coded.plane_size(0), 64 * 64 * 3 / 2);

        let decoded = ctx.g_fmt(Direction::Capture);
        assert_eq!(decoded.pixelformat, FourCC::NV12);
        assert_eq!(decoded.buf_type, BufType::VideoCapture);
        assert_eq!(decoded.plane_size(0), 64 * 64 * 3 / 2);
        assert_eq!(decoded.colorspace, Colorspace::Jpeg);
    }

    #[test]
    fn test_encoder_mapping() {
        let ctx = context(CodecType::Encoder, true);
        assert_eq!(ctx.g_fmt(Direction::Capture).pixelformat, FourCC::H264_SLICE);
        assert_eq!(ctx.g_fmt(Direction::Output).pixelformat, FourCC::NV12);
        assert_eq!(ctx.enum_fmt(Direction::Output, 1).unwrap(), FourCC::YUV420M);
        assert_eq!(ctx.enum_fmt(Direction::Capture, 1).unwrap(), FourCC::VP8_FRAME);
        assert!(matches!(
            ctx.enum_fmt(Direction::Capture, 2),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_try_coded() {
        let ctx = context(CodecType::Decoder, true);
        let mut f = PixFormat::new(BufType::VideoOutputMplane, FourCC::H264_SLICE).with_size(1000, 5000);
        f.num_planes = 3;
        f.field = Field::Interlaced;
        ctx.try_fmt(&mut f).unwrap();
        assert_eq!((f.width, f.height), (1008, 1088));
        assert_eq!(f.num_planes, 1);
        assert_eq!(f.field, Field::None);

        let mut f = PixFormat::new(BufType::VideoOutputMplane, FourCC::MJPEG);
        assert!(matches!(
            ctx.try_fmt(&mut f),
            Err(Error::UnsupportedFormat(FourCC::MJPEG))
        ));

        let mut f = PixFormat::new(BufType::VideoOutput, FourCC::H264_SLICE);
        assert!(matches!(ctx.try_fmt(&mut f), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_try_decoded_uses_active_constraint() {
        let ctx = context(CodecType::Decoder, true);
        let mut f = PixFormat::new(BufType::VideoCaptureMplane, FourCC::YUV420M).with_size(4096, 4096);
        ctx.try_fmt(&mut f).unwrap();
        assert_eq!((f.width, f.height), (1920, 1088));
        assert_eq!(f.num_planes, 3);
        assert_eq!(f.plane_size(1), 960 * 544);

        let mut f = PixFormat::new(BufType::VideoCaptureMplane, FourCC::GREY);
        assert!(matches!(ctx.try_fmt(&mut f), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_s_fmt_coded_updates_decoded() {
        let mut ctx = context(CodecType::Decoder, false);

        let mut d = PixFormat::new(BufType::VideoCapture, FourCC::NV12).with_size(1280, 720);
        ctx.s_fmt(&mut d).unwrap();

        let mut f = PixFormat::new(BufType::VideoOutput, FourCC::VP8_FRAME).with_size(640, 480);
        f.colorspace = Colorspace::Rec709;
        ctx.s_fmt(&mut f).unwrap();

        assert_eq!(ctx.coded_fmt_desc().unwrap().fourcc, FourCC::VP8_FRAME);
        assert!(!ctx.queue(Direction::Output).requires_requests());
        let decoded = ctx.g_fmt(Direction::Capture);
        assert_eq!(decoded.colorspace, Colorspace::Rec709);
        assert_eq!((decoded.width, decoded.height), (1280, 720));

        let mut f = PixFormat::new(BufType::VideoOutput, FourCC::H264_SLICE).with_size(640, 480);
        ctx.s_fmt(&mut f).unwrap();
        assert!(ctx.queue(Direction::Output).requires_requests());
        assert_eq!(ctx.g_fmt(Direction::Capture).height, 720);
    }

    #[test]
    fn test_busy() {
        let mut ctx = context(CodecType::Decoder, false);
        ctx.queue_mut(Direction::Capture).set_num_buffers(2);

        let before = ctx.g_fmt(Direction::Capture).clone();
        let mut f = PixFormat::new(BufType::VideoCapture, FourCC::NV12).with_size(320, 240);
        assert!(matches!(
            ctx.s_fmt(&mut f),
            Err(Error::Busy(BufType::VideoCapture))
        ));
        assert_eq!(ctx.g_fmt(Direction::Capture), &before);
    }

    #[test]
    fn test_enum_framesizes() {
        let ctx = context(CodecType::Decoder, false);
        let c = ctx.enum_framesizes(FourCC::H264_SLICE, 0).unwrap();
        assert_eq!(c.max_width, 1920);
        assert!(matches!(
            ctx.enum_framesizes(FourCC::H264_SLICE, 1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ctx.enum_framesizes(FourCC::VP8_FRAME, 0),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            ctx.enum_framesizes(FourCC::HEVC_SLICE, 0),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_try_decoded_unbounded_size() {
        let mut ctx = context(CodecType::Decoder, false);
        let mut f = PixFormat::new(BufType::VideoOutput, FourCC::VP8_FRAME).with_size(640, 480);
        ctx.s_fmt(&mut f).unwrap();

        // VP8 carries no frame size constraint, nothing clamps the request
        let mut f = PixFormat::new(BufType::VideoCapture, FourCC::XRGB32).with_size(70000, 70000);
        assert!(matches!(ctx.try_fmt(&mut f), Err(Error::InvalidArgument(_))));

        let before = ctx.g_fmt(Direction::Capture).clone();
        assert!(matches!(ctx.s_fmt(&mut f), Err(Error::InvalidArgument(_))));
        assert_eq!(ctx.g_fmt(Direction::Capture), &before);

        let mut f = PixFormat::new(BufType::VideoCapture, FourCC::XRGB32).with_size(4000, 3000);
        ctx.try_fmt(&mut f).unwrap();
        assert_eq!(f.plane_size(0), 4000 * 3000 * 4);
    }

    #[test]
    fn test_reset_coded_keeps_state_on_failure() {
        let fail = Arc::new(AtomicBool::new(false));
        let caps = CodecCaps::new(
            vec![
                CodedFormatDesc::new(FourCC::VP8_FRAME).with_ops(Arc::new(Flaky { fail: fail.clone() })),
                CodedFormatDesc::new(FourCC::H264_SLICE).with_ops(Arc::new(Coded)),
            ],
            vec![DecodedFormatDesc::new(FourCC::NV12)],
        );
        let codec =
            CodecInstance::new(CodecType::Decoder, M2mDevice::new(), caps, Arc::new(Ops(false)), "flaky")
                .unwrap();
        let mut ctx = CodecContext::new(&codec).unwrap();

        let mut f = PixFormat::new(BufType::VideoOutput, FourCC::H264_SLICE).with_size(320, 240);
        ctx.s_fmt(&mut f).unwrap();

        fail.store(true, Ordering::SeqCst);
        assert!(matches!(ctx.reset_coded_fmt(), Err(Error::InvalidArgument(_))));
        assert_eq!(ctx.coded_fmt_desc().unwrap().fourcc, FourCC::H264_SLICE);
        assert_eq!(ctx.g_fmt(Direction::Output).pixelformat, FourCC::H264_SLICE);
    }
}
