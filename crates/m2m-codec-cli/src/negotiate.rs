// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use crate::profile::DeviceProfile;
use crate::utils::{parse_colorspace, parse_fourcc, parse_resolution};
use crate::virt::VirtualDevice;
use clap::Args as ClapArgs;
use m2m_codec::context::CodecContext;
use m2m_codec::format::PixFormat;
use serde::Serialize;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Device profile: a built-in name or a JSON file
    #[arg(short, long)]
    profile: Option<String>,

    /// Coded format FOURCC (e.g. S264)
    #[arg(long)]
    coded: Option<String>,

    /// Decoded format FOURCC (e.g. NV12)
    #[arg(long)]
    decoded: Option<String>,

    /// Frame size requested on both queues (e.g. 1920x1080)
    #[arg(short, long)]
    size: Option<String>,

    /// Colorspace of the coded stream (e.g. rec709)
    #[arg(long)]
    colorspace: Option<String>,

    /// Only try the formats without committing them
    #[arg(long)]
    try_only: bool,
}

#[derive(Debug, Serialize)]
struct FormatReport {
    queue: String,
    fourcc: String,
    width: u32,
    height: u32,
    colorspace: String,
    planes: Vec<PlaneReport>,
}

#[derive(Debug, Serialize)]
struct PlaneReport {
    bytesperline: u32,
    sizeimage: u32,
}

impl FormatReport {
    fn new(f: &PixFormat) -> Self {
        FormatReport {
            queue: f.buf_type.to_string(),
            fourcc: f.pixelformat.to_string(),
            width: f.width,
            height: f.height,
            colorspace: format!("{:?}", f.colorspace),
            planes: f
                .planes()
                .iter()
                .map(|p| PlaneReport {
                    bytesperline: p.bytesperline,
                    sizeimage: p.sizeimage,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct NegotiationReport {
    committed: bool,
    coded: FormatReport,
    decoded: FormatReport,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    let size = args.size.as_deref().map(parse_resolution).transpose()?;
    let coded_fourcc = args.coded.as_deref().map(parse_fourcc).transpose()?;
    let decoded_fourcc = args.decoded.as_deref().map(parse_fourcc).transpose()?;
    let colorspace = args.colorspace.as_deref().map(parse_colorspace).transpose()?;

    let profile = DeviceProfile::load(args.profile.as_deref())?;
    let dev = VirtualDevice::open(profile)?;
    let mut ctx = CodecContext::new(&dev.codec)?;
    let coded_dir = ctx.codec_type().coded_direction();
    let decoded_dir = coded_dir.opposite();

    // The coded side goes first: it bounds what the decoded side may use.
    let mut coded = ctx.g_fmt(coded_dir).clone();
    if let Some(fourcc) = coded_fourcc {
        coded.pixelformat = fourcc;
    }
    if let Some((width, height)) = size {
        coded.width = width;
        coded.height = height;
    }
    if let Some(cs) = colorspace {
        coded.colorspace = cs;
    }

    let adjust_decoded = |mut f: PixFormat| {
        if let Some(fourcc) = decoded_fourcc {
            f.pixelformat = fourcc;
        }
        if let Some((width, height)) = size {
            f.width = width;
            f.height = height;
        }
        f
    };

    let report = if args.try_only {
        ctx.try_fmt(&mut coded)?;
        let mut decoded = adjust_decoded(ctx.g_fmt(decoded_dir).clone());
        ctx.try_fmt(&mut decoded)?;
        NegotiationReport {
            committed: false,
            coded: FormatReport::new(&coded),
            decoded: FormatReport::new(&decoded),
        }
    } else {
        ctx.s_fmt(&mut coded)?;
        // Start from the decoded format the coded commit just updated.
        let mut decoded = adjust_decoded(ctx.g_fmt(decoded_dir).clone());
        ctx.s_fmt(&mut decoded)?;
        NegotiationReport {
            committed: true,
            coded: FormatReport::new(ctx.g_fmt(coded_dir)),
            decoded: FormatReport::new(ctx.g_fmt(decoded_dir)),
        }
    };
    log::debug!("{}: negotiated {} / {}", ctx.id(), ctx.coded_fmt(), ctx.decoded_fmt());
    ctx.cleanup();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (label, f) in [("Coded", &report.coded), ("Decoded", &report.decoded)] {
            println!(
                "{:<8} {} {} {}x{} colorspace {}",
                label, f.queue, f.fourcc, f.width, f.height, f.colorspace
            );
            for (i, plane) in f.planes.iter().enumerate() {
                println!(
                    "         plane {}: {} bytes/line, {} bytes",
                    i, plane.bytesperline, plane.sizeimage
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use m2m_codec::format::{BufType, Direction};
    use m2m_codec::fourcc::FourCC;

    #[test]
    fn test_format_report() {
        let f = PixFormat::new(BufType::VideoCaptureMplane, FourCC::NV12).with_size(64, 48);
        let report = FormatReport::new(&f);
        assert_eq!(report.fourcc, "NV12");
        assert_eq!(report.width, 64);
        assert_eq!(report.colorspace, "Jpeg");
        assert_eq!(report.planes.len(), 1);
    }

    #[test]
    fn test_direction_pairing() {
        let dev = VirtualDevice::open(DeviceProfile::builtin("vepu").unwrap()).unwrap();
        let ctx = CodecContext::new(&dev.codec).unwrap();
        assert_eq!(ctx.codec_type().coded_direction(), Direction::Capture);
        assert_eq!(ctx.g_fmt(Direction::Capture).pixelformat, FourCC::H264);
    }
}
