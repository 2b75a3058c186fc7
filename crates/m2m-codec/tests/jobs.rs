// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// Job runner tests
//
// Requests flow from queue_request through the scheduler, the coded
// format's run hook and the completion channel back to dqbuf. Tests that
// wait on the completion channel run serially.
//
// RUN:
//   cargo test -p m2m-codec --test jobs

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use unix_ts::Timestamp;

use m2m_codec::caps::{CodecCaps, CodedFormatDesc, CodedFormatOps, DecodedFormatDesc};
use m2m_codec::codec::{CodecInstance, CodecType};
use m2m_codec::completion::{completion_channel, JobDispatcher};
use m2m_codec::context::CodecContext;
use m2m_codec::ctrls::{ControlValue, MediaRequest};
use m2m_codec::format::Direction;
use m2m_codec::fourcc::FourCC;
use m2m_codec::h264;
use m2m_codec::queue::{BufferState, BUF_FLAG_KEYFRAME};
use m2m_codec::scheduler::M2mDevice;
use m2m_codec::Error;

use common::{h264_codec, init_logging, H264Ops, Plain};

/// Queue `frames` decode requests. Frame `i` carries timestamp `i` seconds
/// and an SPS payload filled with byte `i`.
fn queue_frames(ctx: &mut CodecContext, frames: u32) -> Vec<Arc<MediaRequest>> {
    for buf in ctx.reqbufs(Direction::Capture, frames).unwrap() {
        ctx.qbuf(buf).unwrap();
    }

    let mut requests = Vec::new();
    for (i, mut buf) in ctx.reqbufs(Direction::Output, frames).unwrap().into_iter().enumerate() {
        buf.timestamp = Timestamp::new(i as i64, 0);
        buf.flags = BUF_FLAG_KEYFRAME;
        buf.planes[0].bytesused = 100;

        let req = MediaRequest::new();
        req.attach(buf);
        let ctrls = [
            (h264::CID_H264_DECODE_PARAMS, h264::DECODE_PARAMS_SIZE),
            (h264::CID_H264_SLICE_PARAMS, h264::SLICE_PARAMS_SIZE),
            (h264::CID_H264_SPS, h264::SPS_SIZE),
            (h264::CID_H264_PPS, h264::PPS_SIZE),
            (h264::CID_H264_SCALING_MATRIX, h264::SCALING_MATRIX_SIZE),
        ];
        for (id, size) in ctrls {
            ctx.set_request_control(&req, id, ControlValue::Compound(vec![i as u8; size]))
                .unwrap();
        }
        ctx.queue_request(&req).unwrap();
        requests.push(req);
    }

    ctx.streamon(Direction::Output).unwrap();
    ctx.streamon(Direction::Capture).unwrap();
    requests
}

#[test]
#[serial]
fn test_decode_flow() {
    init_logging();
    let ops = H264Ops::new();
    let (tx, rx) = completion_channel();
    *ops.done.lock().unwrap() = Some(tx);

    let codec = h264_codec(ops.clone(), false);
    let mut ctx = CodecContext::new(&codec).unwrap();
    let requests = queue_frames(&mut ctx, 4);

    let mut dispatcher = JobDispatcher::new();
    let id = dispatcher.insert(ctx);
    dispatcher.kick(id);

    let mut completed = 0;
    while let Some(done) = rx.recv_timeout(Duration::from_millis(200)) {
        assert_eq!(done.ctx, id);
        dispatcher.complete(done);
        completed += 1;
    }
    assert_eq!(completed, 4);
    assert_eq!(ops.runs.load(Ordering::SeqCst), 4);
    assert_eq!(*ops.sps_seen.lock().unwrap(), vec![3u8; h264::SPS_SIZE]);
    assert_eq!(codec.device().running(), None);

    let ctx = dispatcher.get_mut(id).unwrap();
    for i in 0..4 {
        let dst = ctx.dqbuf(Direction::Capture).unwrap();
        assert_eq!(dst.state(), BufferState::Done);
        assert_eq!(dst.timestamp, Timestamp::new(i, 0));
        assert_eq!(dst.flags & BUF_FLAG_KEYFRAME, BUF_FLAG_KEYFRAME);

        let src = ctx.dqbuf(Direction::Output).unwrap();
        assert_eq!(src.state(), BufferState::Done);
    }
    for req in &requests {
        assert!(req.is_complete());
    }
}

#[test]
#[serial]
fn test_contexts_share_the_device() {
    init_logging();
    let ops = H264Ops::new();
    let (tx, rx) = completion_channel();
    *ops.done.lock().unwrap() = Some(tx);

    let codec = h264_codec(ops.clone(), false);
    let mut dispatcher = JobDispatcher::new();
    let mut ids = Vec::new();
    for _ in 0..2 {
        let mut ctx = CodecContext::new(&codec).unwrap();
        queue_frames(&mut ctx, 2);
        ids.push(dispatcher.insert(ctx));
    }
    for &id in &ids {
        dispatcher.kick(id);
    }

    let mut order = Vec::new();
    while let Some(done) = rx.recv_timeout(Duration::from_millis(200)) {
        order.push(done.ctx);
        dispatcher.complete(done);
    }
    // The finished context queues behind the one already waiting.
    assert_eq!(order, vec![ids[0], ids[1], ids[0], ids[1]]);
}

struct Broken;

impl CodedFormatOps for Broken {
    fn run(&self, _ctx: &mut CodecContext) -> Result<(), Error> {
        Err(Error::InvalidArgument("hardware hung".into()))
    }
}

#[test]
fn test_failed_run_returns_buffers_in_error() {
    init_logging();
    let caps = CodecCaps::new(
        vec![CodedFormatDesc::new(FourCC::VP8_FRAME).with_ops(Arc::new(Broken))],
        vec![DecodedFormatDesc::new(FourCC::NV12)],
    );
    let codec = CodecInstance::new(
        CodecType::Decoder,
        M2mDevice::new(),
        caps,
        Arc::new(Plain { multiplanar: false }),
        "broken",
    )
    .unwrap();

    let mut ctx = CodecContext::new(&codec).unwrap();
    for dir in [Direction::Output, Direction::Capture] {
        for buf in ctx.reqbufs(dir, 3).unwrap() {
            ctx.qbuf(buf).unwrap();
        }
        ctx.streamon(dir).unwrap();
    }

    let mut dispatcher = JobDispatcher::new();
    let id = dispatcher.insert(ctx);
    dispatcher.kick(id);

    let ctx = dispatcher.get_mut(id).unwrap();
    assert!(!ctx.job_ready());
    for dir in [Direction::Output, Direction::Capture] {
        for _ in 0..3 {
            assert_eq!(ctx.dqbuf(dir).unwrap().state(), BufferState::Error);
        }
    }
    assert_eq!(codec.device().running(), None);
}

#[test]
fn test_start_failure_keeps_queue_stopped() {
    init_logging();
    let ops = Arc::new(H264Ops {
        fail_start: true,
        ..Default::default()
    });
    let codec = h264_codec(ops, false);
    let mut ctx = CodecContext::new(&codec).unwrap();
    let _bufs = ctx.reqbufs(Direction::Output, 1).unwrap();

    assert!(ctx.streamon(Direction::Output).is_err());
    assert!(!ctx.queue(Direction::Output).is_streaming());
}

#[test]
fn test_failed_run_completes_requests() {
    init_logging();
    let ops = Arc::new(H264Ops {
        fail_run: true,
        ..Default::default()
    });
    let codec = h264_codec(ops.clone(), false);
    let mut ctx = CodecContext::new(&codec).unwrap();
    let requests = queue_frames(&mut ctx, 2);

    let mut dispatcher = JobDispatcher::new();
    let id = dispatcher.insert(ctx);
    dispatcher.kick(id);

    assert_eq!(ops.runs.load(Ordering::SeqCst), 2);
    for req in &requests {
        assert!(req.is_complete());
    }
    let ctx = dispatcher.get_mut(id).unwrap();
    for _ in 0..2 {
        assert_eq!(ctx.dqbuf(Direction::Output).unwrap().state(), BufferState::Error);
        assert_eq!(ctx.dqbuf(Direction::Capture).unwrap().state(), BufferState::Error);
    }
    assert_eq!(codec.device().running(), None);
}

#[test]
fn test_job_finish_normalises_state() {
    init_logging();
    let codec = h264_codec(H264Ops::new(), false);
    let mut ctx = CodecContext::new(&codec).unwrap();
    let requests = queue_frames(&mut ctx, 1);

    assert!(ctx.try_schedule());
    assert_eq!(ctx.job_finish(BufferState::Queued), None);

    assert!(requests[0].is_complete());
    assert_eq!(ctx.dqbuf(Direction::Output).unwrap().state(), BufferState::Error);
    assert_eq!(ctx.dqbuf(Direction::Capture).unwrap().state(), BufferState::Error);
    assert_eq!(codec.device().running(), None);
}
