// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use crate::profile::DeviceProfile;
use crate::utils::parse_fourcc;
use crate::virt::VirtualDevice;
use clap::Args as ClapArgs;
use m2m_codec::context::CodecContext;
use serde::Serialize;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Coded format FOURCC to query
    fourcc: String,

    /// Frame size index; coded formats expose a single stepwise range
    #[arg(short, long, default_value_t = 0)]
    index: u32,

    /// Device profile: a built-in name or a JSON file
    #[arg(short, long)]
    profile: Option<String>,
}

#[derive(Debug, Serialize)]
struct FrameSizeReport {
    fourcc: String,
    min_width: u32,
    max_width: u32,
    step_width: u32,
    min_height: u32,
    max_height: u32,
    step_height: u32,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    let fourcc = parse_fourcc(&args.fourcc)?;
    let profile = DeviceProfile::load(args.profile.as_deref())?;
    let dev = VirtualDevice::open(profile)?;
    let ctx = CodecContext::new(&dev.codec)?;

    let frmsize = ctx.enum_framesizes(fourcc, args.index);
    ctx.cleanup();
    let frmsize = frmsize?;

    if json {
        let report = FrameSizeReport {
            fourcc: fourcc.to_string(),
            min_width: frmsize.min_width,
            max_width: frmsize.max_width,
            step_width: frmsize.step_width,
            min_height: frmsize.min_height,
            max_height: frmsize.max_height,
            step_height: frmsize.step_height,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {}", fourcc, frmsize);
    }
    Ok(())
}
