// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use m2m_codec::format::Colorspace;
use m2m_codec::fourcc::FourCC;
use signal_hook::consts::SIGINT;
use signal_hook::flag;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Parse resolution string in format "WxH" or "W*H"
pub fn parse_resolution(s: &str) -> Result<(u32, u32), CliError> {
    let (width_str, height_str) = s
        .split_once('x')
        .or_else(|| s.split_once('*'))
        .ok_or_else(|| {
            CliError::InvalidArgs(format!(
                "Invalid resolution format (expected WxH or W*H): {}",
                s
            ))
        })?;

    let width = width_str
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("Invalid width in resolution: {}", s)))?;
    let height = height_str
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("Invalid height in resolution: {}", s)))?;

    if width == 0 || height == 0 {
        return Err(CliError::InvalidArgs(format!(
            "Resolution dimensions must be positive: {}",
            s
        )));
    }

    Ok((width, height))
}

/// Parse a FOURCC code such as `NV12` or `S264`
pub fn parse_fourcc(s: &str) -> Result<FourCC, CliError> {
    s.parse::<FourCC>()
        .map_err(|_| CliError::InvalidArgs(format!("FOURCC must be exactly 4 characters: {}", s)))
}

/// Parse a colorspace name as printed by the negotiate command
pub fn parse_colorspace(s: &str) -> Result<Colorspace, CliError> {
    let cs = match s.to_lowercase().as_str() {
        "default" => Colorspace::Default,
        "smpte170m" => Colorspace::Smpte170m,
        "smpte240m" => Colorspace::Smpte240m,
        "rec709" => Colorspace::Rec709,
        "bt878" => Colorspace::Bt878,
        "470m" | "sysm470" => Colorspace::SysM470,
        "470bg" | "bt470bg" => Colorspace::Bt470Bg,
        "jpeg" => Colorspace::Jpeg,
        "srgb" => Colorspace::Srgb,
        "oprgb" => Colorspace::OpRgb,
        "bt2020" => Colorspace::Bt2020,
        "raw" => Colorspace::Raw,
        "dcip3" => Colorspace::DciP3,
        _ => return Err(CliError::InvalidArgs(format!("Unknown colorspace: {}", s))),
    };
    Ok(cs)
}

/// Install signal handler for graceful shutdown on Ctrl+C
///
/// Returns an Arc<AtomicBool> that will be set to true when SIGINT is received.
/// Check this flag periodically in your main loop to exit gracefully.
pub fn install_signal_handler() -> Result<Arc<AtomicBool>, CliError> {
    let term = Arc::new(AtomicBool::new(false));

    flag::register(SIGINT, Arc::clone(&term))
        .map_err(|e| CliError::General(format!("Failed to register signal handler: {}", e)))?;

    log::debug!("Installed SIGINT handler");
    Ok(term)
}
