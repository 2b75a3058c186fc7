// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Integration tests for the m2m-codec CLI
//!
//! These tests run the binary end-to-end against the built-in virtual
//! device profiles using the assert_cmd crate pattern.

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::{env, fs, path::PathBuf};

/// Helper to create a Command for the m2m-codec binary
/// Uses M2M_CODEC_BIN environment variable if set, otherwise the binary
/// cargo built for this test run
fn m2m_codec_cmd() -> Command {
    match env::var("M2M_CODEC_BIN") {
        Ok(bin_path) => Command::new(bin_path),
        Err(_) => Command::new(env!("CARGO_BIN_EXE_m2m-codec")),
    }
}

/// Write a profile into the temp directory and return its path
fn write_profile(name: &str, contents: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("m2m-codec-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("Failed to create temp dir");
    let path = dir.join(name);
    fs::write(&path, contents).expect("Failed to write profile");
    path
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not valid JSON")
}

// ============================================================================
// Basic Commands
// ============================================================================

#[test]
fn test_help() {
    m2m_codec_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("negotiate"))
        .stdout(predicate::str::contains("framesizes"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_version() {
    m2m_codec_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("m2m-codec"));
}

// ============================================================================
// Info Command
// ============================================================================

#[test]
#[serial]
fn test_info_default_profile() {
    m2m_codec_cmd()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("rkvdec (decoder)"))
        .stdout(predicate::str::contains("platform:rkvdec"))
        .stdout(predicate::str::contains("S264"))
        .stdout(predicate::str::contains("NV12"));
}

#[test]
#[serial]
fn test_info_json() {
    let output = m2m_codec_cmd()
        .args(["info", "--json", "--controls"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["codec_type"], "decoder");
    assert_eq!(json["multiplanar"], true);
    assert_eq!(json["coded_formats"][0]["fourcc"], "S264");
    assert_eq!(json["coded_formats"][0]["requires_requests"], true);
    assert_eq!(json["coded_formats"][0]["control_count"], 6);
    assert_eq!(
        json["coded_formats"][0]["controls"].as_array().unwrap().len(),
        6
    );
    assert_eq!(json["decoded_formats"][0], "NV12");
}

#[test]
#[serial]
fn test_info_encoder_controls() {
    m2m_codec_cmd()
        .args(["info", "--profile", "vepu", "--controls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vepu (encoder)"))
        .stdout(predicate::str::contains("Video Bitrate"));
}

#[test]
#[serial]
fn test_info_missing_profile() {
    m2m_codec_cmd()
        .args(["info", "--profile", "/nonexistent/board.json"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Profile not found"));
}

#[test]
#[serial]
fn test_info_malformed_profile() {
    let path = write_profile("broken.json", "{ \"name\": \"broken\" ");
    m2m_codec_cmd()
        .args(["info", "--profile"])
        .arg(&path)
        .assert()
        .failure()
        .code(2);
}

// ============================================================================
// Framesizes Command
// ============================================================================

#[test]
#[serial]
fn test_framesizes_h264() {
    m2m_codec_cmd()
        .args(["framesizes", "S264"])
        .assert()
        .success()
        .stdout(predicate::str::contains("48x48 - 3840x2160 (step 16x16)"));
}

#[test]
#[serial]
fn test_framesizes_errors() {
    // Malformed fourcc
    m2m_codec_cmd()
        .args(["framesizes", "NV1"])
        .assert()
        .failure()
        .code(2);

    // Raw formats carry no frame size constraint
    m2m_codec_cmd()
        .args(["framesizes", "NV12"])
        .assert()
        .failure()
        .code(4);

    // Only one stepwise entry exists
    m2m_codec_cmd()
        .args(["framesizes", "S264", "--index", "1"])
        .assert()
        .failure()
        .code(2);
}

// ============================================================================
// Negotiate Command
// ============================================================================

#[test]
#[serial]
fn test_negotiate_clamps_to_frame_size() {
    let output = m2m_codec_cmd()
        .args([
            "negotiate",
            "--size",
            "1920x1080",
            "--colorspace",
            "rec709",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["committed"], true);
    assert_eq!(json["coded"]["fourcc"], "S264");
    assert_eq!(json["coded"]["width"], 1920);
    assert_eq!(json["coded"]["height"], 1088);
    assert_eq!(json["decoded"]["fourcc"], "NV12");
    assert_eq!(json["decoded"]["width"], 1920);
    assert_eq!(json["decoded"]["height"], 1088);
    assert_eq!(json["decoded"]["colorspace"], "Rec709");
}

#[test]
#[serial]
fn test_negotiate_unsupported_format() {
    m2m_codec_cmd()
        .args(["negotiate", "--decoded", "MJPG"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unsupported format: MJPG"));
}

// ============================================================================
// Run Command
// ============================================================================

#[test]
#[serial]
fn test_run_decoder() {
    let output = m2m_codec_cmd()
        .args(["run", "--frames", "3", "--buffers", "2", "--json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json = stdout_json(&output);
    assert_eq!(json["jobs_done"], 3);
    assert_eq!(json["jobs_failed"], 0);
}

#[test]
#[serial]
fn test_run_encoder() {
    let output = m2m_codec_cmd()
        .args(["run", "--profile", "vepu", "--frames", "2", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["jobs_done"], 2);
}

#[test]
#[serial]
fn test_run_custom_profile() {
    let path = write_profile(
        "vp8.json",
        r#"{
            "name": "virt-vp8",
            "codec_type": "decoder",
            "latency_us": 100,
            "coded_formats": [{
                "fourcc": "VP8F",
                "requires_requests": true,
                "frame_size": {
                    "min_width": 16, "max_width": 1920, "step_width": 16,
                    "min_height": 16, "max_height": 1088, "step_height": 16
                },
                "controls": [
                    {"id": 10, "name": "VP8 Frame", "type": "compound", "size": 64,
                     "per_request": true, "mandatory": true}
                ]
            }],
            "decoded_formats": ["NV12", "YU12"]
        }"#,
    );

    let output = m2m_codec_cmd()
        .args(["run", "--frames", "5", "--size", "320x240", "--json", "--profile"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["jobs_done"], 5);
}

#[test]
fn test_run_rejects_zero_frames() {
    m2m_codec_cmd()
        .args(["run", "--frames", "0"])
        .assert()
        .failure()
        .code(2);
}
