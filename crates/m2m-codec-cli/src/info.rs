// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use crate::profile::DeviceProfile;
use crate::virt::VirtualDevice;
use clap::Args as ClapArgs;
use m2m_codec::caps::{ControlDesc, ControlKind};
use m2m_codec::context::CodecContext;
use serde::Serialize;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Device profile: a built-in name or a JSON file
    #[arg(short, long)]
    profile: Option<String>,

    /// Also list the controls of every coded format
    #[arg(long)]
    controls: bool,
}

#[derive(Debug, Serialize)]
struct CodecInfo {
    name: String,
    codec_type: String,
    bus_info: String,
    device_caps: String,
    multiplanar: bool,
    job_latency_us: u64,
    coded_formats: Vec<CodedFormatInfo>,
    decoded_formats: Vec<String>,
    default_coded: String,
    default_decoded: String,
}

#[derive(Debug, Serialize)]
struct CodedFormatInfo {
    fourcc: String,
    requires_requests: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame_size: Option<String>,
    control_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    controls: Vec<ControlInfo>,
}

#[derive(Debug, Serialize)]
struct ControlInfo {
    id: String,
    name: String,
    kind: String,
    per_request: bool,
    mandatory: bool,
}

impl From<&ControlDesc> for ControlInfo {
    fn from(desc: &ControlDesc) -> Self {
        let kind = match desc.config.kind {
            ControlKind::Integer { min, max, step, .. } => {
                format!("integer [{}..{}] step {}", min, max, step)
            }
            ControlKind::Boolean { .. } => "boolean".to_string(),
            ControlKind::Menu { min, max, .. } => format!("menu [{}..{}]", min, max),
            ControlKind::Compound { size } => format!("compound {} bytes", size),
        };
        ControlInfo {
            id: desc.config.id.to_string(),
            name: desc.config.name.clone(),
            kind,
            per_request: desc.per_request,
            mandatory: desc.mandatory,
        }
    }
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    let profile = DeviceProfile::load(args.profile.as_deref())?;
    let dev = VirtualDevice::open(profile)?;
    let codec = &dev.codec;

    // A fresh context shows the formats applications start from.
    let ctx = CodecContext::new(codec)?;

    let info = CodecInfo {
        name: codec.name().to_string(),
        codec_type: codec.codec_type().to_string(),
        bus_info: codec.bus_info(),
        device_caps: codec.device_caps().to_string(),
        multiplanar: codec.is_multiplanar(),
        job_latency_us: dev.profile.latency_us,
        coded_formats: codec
            .caps()
            .coded_fmts()
            .iter()
            .map(|desc| CodedFormatInfo {
                fourcc: desc.fourcc.to_string(),
                requires_requests: desc.requires_requests,
                frame_size: desc.frmsize.map(|f| f.to_string()),
                control_count: desc.ctrls.len(),
                controls: if args.controls {
                    desc.ctrls.iter().map(ControlInfo::from).collect()
                } else {
                    Vec::new()
                },
            })
            .collect(),
        decoded_formats: codec
            .caps()
            .decoded_fmts()
            .iter()
            .map(|desc| desc.fourcc.to_string())
            .collect(),
        default_coded: ctx.coded_fmt().to_string(),
        default_decoded: ctx.decoded_fmt().to_string(),
    };
    ctx.cleanup();

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print_text(&info);
    }
    Ok(())
}

fn print_text(info: &CodecInfo) {
    println!("=== {} ({}) ===", info.name, info.codec_type);
    println!("Bus info:      {}", info.bus_info);
    println!("Device caps:   {}", info.device_caps);
    println!("Multiplanar:   {}", info.multiplanar);
    println!("Job latency:   {} µs", info.job_latency_us);

    println!("\nCoded formats:");
    for fmt in &info.coded_formats {
        println!(
            "  {}  requests: {}  controls: {}",
            fmt.fourcc,
            if fmt.requires_requests { "yes" } else { "no" },
            fmt.control_count
        );
        if let Some(size) = &fmt.frame_size {
            println!("        frame size {}", size);
        }
        for ctrl in &fmt.controls {
            let flags = match (ctrl.per_request, ctrl.mandatory) {
                (true, true) => " (per-request, mandatory)",
                (true, false) => " (per-request)",
                (false, true) => " (mandatory)",
                (false, false) => "",
            };
            println!("        {} {}: {}{}", ctrl.id, ctrl.name, ctrl.kind, flags);
        }
    }

    println!("\nDecoded formats:");
    for fourcc in &info.decoded_formats {
        println!("  {}", fourcc);
    }

    println!("\nDefaults:");
    println!("  coded:   {}", info.default_coded);
    println!("  decoded: {}", info.default_decoded);
}
