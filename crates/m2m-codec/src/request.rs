// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Media request validation and submission

use std::sync::Arc;

use crate::caps::ControlId;
use crate::context::CodecContext;
use crate::ctrls::{ControlValue, MediaRequest, RequestControls, RequestState};
use crate::Error;

impl CodecContext {
    /// Store a control value in a request. The control must be registered
    /// on this context and the value must fit its configuration.
    pub fn set_request_control(
        &self,
        req: &MediaRequest,
        id: ControlId,
        value: ControlValue,
    ) -> Result<(), Error> {
        let ctrl = self
            .ctrl_hdl
            .find(id)
            .ok_or_else(|| Error::NotFound(format!("control {}", id)))?;
        value.check(ctrl.config())?;

        let mut inner = req.lock();
        if inner.state != RequestState::Idle {
            return Err(Error::InvalidArgument(format!(
                "request {} already queued",
                req.id()
            )));
        }

        let snapshot = inner
            .ctrls
            .get_or_insert_with(|| RequestControls::new(self.id));
        if snapshot.owner() != self.id {
            return Err(Error::InvalidArgument(format!(
                "request {} carries controls of {}",
                req.id(),
                snapshot.owner()
            )));
        }
        snapshot.insert(id, value);
        Ok(())
    }

    /// Check that a request is complete before it reaches the codec.
    ///
    /// Exactly one buffer must be attached and owned by this context, the
    /// request must carry controls for this context, and every control of
    /// the active coded format that is both mandatory and per-request must
    /// be present. The buffer itself is checked last.
    pub fn validate_request(&self, req: &MediaRequest) -> Result<(), Error> {
        let inner = req.lock();

        let buf = match inner.buffers.as_slice() {
            [] => return Err(Error::NotFound(format!("request {} has no buffer", req.id()))),
            [buf] => buf,
            bufs => {
                return Err(Error::InvalidArgument(format!(
                    "request {} has {} buffers",
                    req.id(),
                    bufs.len()
                )))
            }
        };
        if buf.owner() != self.id {
            return Err(Error::InvalidArgument(format!(
                "request {} buffer belongs to {}",
                req.id(),
                buf.owner()
            )));
        }

        let snapshot = inner
            .ctrls
            .as_ref()
            .ok_or_else(|| Error::NotFound(format!("request {} has no controls", req.id())))?;
        if snapshot.owner() != self.id {
            return Err(Error::InvalidArgument(format!(
                "request {} carries controls of {}",
                req.id(),
                snapshot.owner()
            )));
        }

        if let Some(desc) = self.coded_fmt_desc() {
            for ctrl in desc.required_ctrls() {
                if !snapshot.contains(ctrl.config.id) {
                    return Err(Error::NotFound(format!(
                        "request {} lacks control {}",
                        req.id(),
                        ctrl.config.name
                    )));
                }
            }
        }

        self.check_buffer(buf)?;
        self.buf_prepare(buf)
    }

    /// Validate a request then hand its buffer to the ready list
    pub fn queue_request(&mut self, req: &Arc<MediaRequest>) -> Result<(), Error> {
        self.validate_request(req)?;

        let mut buf = {
            let mut inner = req.lock();
            inner.state = RequestState::Queued;
            match inner.buffers.pop() {
                Some(buf) => buf,
                None => return Err(Error::NotFound(format!("request {} has no buffer", req.id()))),
            }
        };

        buf.set_request(Some(req.clone()));
        log::trace!("{}: request {} queued with buffer {}", self.id, req.id(), buf.index());
        self.submit_buffer(buf)
    }
}
