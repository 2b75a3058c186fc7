// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Control registry and media requests
//!
//! Every context owns one [`ControlHandler`]. It is sized once, when the
//! context is created, for the worst case: the sum of the controls of every
//! coded format the codec supports. Controls are registered up front so the
//! registry never grows while formats change underneath it.
//!
//! A [`MediaRequest`] bundles one source buffer with the control values that
//! apply to it. The request's control snapshot is applied to the registry in
//! the job preamble and marked complete in the postamble.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::caps::{ControlConfig, ControlId, ControlKind};
use crate::queue::VideoBuffer;
use crate::scheduler::ContextId;
use crate::Error;

/// Upper bound on the number of controls a single context may register
pub const MAX_CONTROLS: usize = 1024;

/// Value of a control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlValue {
    Integer(i64),
    Boolean(bool),
    Menu(i64),
    Compound(Vec<u8>),
}

impl ControlValue {
    /// Default value for a control configuration
    pub fn default_for(kind: &ControlKind) -> ControlValue {
        match *kind {
            ControlKind::Integer { default, .. } => ControlValue::Integer(default),
            ControlKind::Boolean { default } => ControlValue::Boolean(default),
            ControlKind::Menu { default, .. } => ControlValue::Menu(default),
            ControlKind::Compound { size } => ControlValue::Compound(vec![0; size]),
        }
    }

    /// Payload of a compound control
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ControlValue::Compound(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Check a value against a control configuration
    pub fn check(&self, config: &ControlConfig) -> Result<(), Error> {
        let reject = |why: String| {
            Err(Error::InvalidArgument(format!(
                "control {} ({}): {}",
                config.name, config.id, why
            )))
        };

        match (&config.kind, self) {
            (
                ControlKind::Integer {
                    min, max, step, ..
                },
                ControlValue::Integer(v),
            ) => {
                if v < min || v > max {
                    return reject(format!("{} outside {}..={}", v, min, max));
                }
                if v.abs_diff(*min) % step != 0 {
                    return reject(format!("{} not a multiple of step {}", v, step));
                }
            }
            (ControlKind::Boolean { .. }, ControlValue::Boolean(_)) => {}
            (
                ControlKind::Menu {
                    min,
                    max,
                    skip_mask,
                    ..
                },
                ControlValue::Menu(v),
            ) => {
                if v < min || v > max {
                    return reject(format!("menu item {} outside {}..={}", v, min, max));
                }
                if skip_mask & (1u64 << v) != 0 {
                    return reject(format!("menu item {} not supported", v));
                }
            }
            (ControlKind::Compound { size }, ControlValue::Compound(bytes)) => {
                if bytes.len() != *size {
                    return reject(format!("payload is {} bytes, expected {}", bytes.len(), size));
                }
            }
            _ => return reject("value type does not match control type".into()),
        }
        Ok(())
    }
}

/// A registered control and its current value
#[derive(Debug, Clone)]
pub struct Control {
    config: ControlConfig,
    cur: ControlValue,
}

impl Control {
    pub fn id(&self) -> ControlId {
        self.config.id
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Current value
    pub fn value(&self) -> &ControlValue {
        &self.cur
    }
}

/// Fixed capacity control registry of one context
#[derive(Debug, Default)]
pub struct ControlHandler {
    ctrls: Vec<Control>,
    index: HashMap<ControlId, usize>,
}

impl ControlHandler {
    /// Reserve room for `capacity` controls.
    ///
    /// Fails with [`Error::ResourceExhausted`] above [`MAX_CONTROLS`] or when
    /// the allocation itself fails.
    pub fn with_capacity(capacity: usize) -> Result<ControlHandler, Error> {
        if capacity > MAX_CONTROLS {
            return Err(Error::ResourceExhausted(format!(
                "{} controls requested, limit is {}",
                capacity, MAX_CONTROLS
            )));
        }

        let mut ctrls = Vec::new();
        ctrls
            .try_reserve_exact(capacity)
            .map_err(|e| Error::ResourceExhausted(format!("control registry: {}", e)))?;
        let mut index = HashMap::new();
        index
            .try_reserve(capacity)
            .map_err(|e| Error::ResourceExhausted(format!("control index: {}", e)))?;

        Ok(ControlHandler { ctrls, index })
    }

    /// Register a control. A control already registered under the same id is
    /// kept as is. The registry never grows past its initial capacity.
    pub fn add(&mut self, config: &ControlConfig) -> Result<(), Error> {
        if self.index.contains_key(&config.id) {
            log::debug!("control {} ({}) already registered", config.name, config.id);
            return Ok(());
        }
        if self.ctrls.len() == self.ctrls.capacity() {
            return Err(Error::ResourceExhausted(format!(
                "control registry full ({} entries) adding {}",
                self.ctrls.len(),
                config.name
            )));
        }

        self.index.insert(config.id, self.ctrls.len());
        self.ctrls.push(Control {
            config: config.clone(),
            cur: ControlValue::default_for(&config.kind),
        });
        Ok(())
    }

    /// Load the default value of every control
    pub fn setup(&mut self) {
        for ctrl in &mut self.ctrls {
            ctrl.cur = ControlValue::default_for(&ctrl.config.kind);
        }
    }

    pub fn find(&self, id: ControlId) -> Option<&Control> {
        self.index.get(&id).map(|&i| &self.ctrls[i])
    }

    /// Current value of a control
    pub fn value(&self, id: ControlId) -> Option<&ControlValue> {
        self.find(id).map(Control::value)
    }

    /// Set the current value of a control after checking it
    pub fn set(&mut self, id: ControlId, value: ControlValue) -> Result<(), Error> {
        let i = *self
            .index
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("control {}", id)))?;
        value.check(&self.ctrls[i].config)?;
        self.ctrls[i].cur = value;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.ctrls.iter()
    }

    pub fn len(&self) -> usize {
        self.ctrls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ctrls.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ctrls.capacity()
    }

    /// Apply the values carried by a request to the current values
    pub fn request_setup(&mut self, req: &MediaRequest) {
        let inner = req.lock();
        let Some(snapshot) = inner.ctrls.as_ref() else {
            return;
        };

        for (id, value) in &snapshot.values {
            match self.index.get(id) {
                Some(&i) => self.ctrls[i].cur = value.clone(),
                None => log::warn!("request {} carries unknown control {}", req.id(), id),
            }
        }
    }

    /// Mark the request's control snapshot complete. Controls the request
    /// did not set are recorded with their current value so the application
    /// can read back the state the job ran with. Completing twice is a no-op.
    pub fn request_complete(&self, req: &MediaRequest) {
        let mut inner = req.lock();
        if inner.state == RequestState::Complete {
            return;
        }

        if let Some(snapshot) = inner.ctrls.as_mut() {
            for ctrl in &self.ctrls {
                snapshot
                    .values
                    .entry(ctrl.id())
                    .or_insert_with(|| ctrl.cur.clone());
            }
            snapshot.complete = true;
        }
        inner.state = RequestState::Complete;
    }
}

/// Lifecycle of a media request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Being filled by the application
    Idle,
    /// Validated and handed to the codec
    Queued,
    /// Job done, control state released
    Complete,
}

/// Control values carried by a request, bound to one context
#[derive(Debug, Clone)]
pub struct RequestControls {
    owner: ContextId,
    values: BTreeMap<ControlId, ControlValue>,
    complete: bool,
}

impl RequestControls {
    pub(crate) fn new(owner: ContextId) -> RequestControls {
        RequestControls {
            owner,
            values: BTreeMap::new(),
            complete: false,
        }
    }

    pub fn owner(&self) -> ContextId {
        self.owner
    }

    pub fn contains(&self, id: ControlId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn get(&self, id: ControlId) -> Option<&ControlValue> {
        self.values.get(&id)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub(crate) fn insert(&mut self, id: ControlId, value: ControlValue) {
        self.values.insert(id, value);
    }
}

pub(crate) struct RequestInner {
    pub(crate) buffers: Vec<VideoBuffer>,
    pub(crate) ctrls: Option<RequestControls>,
    pub(crate) state: RequestState,
}

/// Atomic bundle of per-frame controls and the buffer they apply to
pub struct MediaRequest {
    id: u64,
    inner: Mutex<RequestInner>,
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

impl MediaRequest {
    pub fn new() -> Arc<MediaRequest> {
        Arc::new(MediaRequest {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(RequestInner {
                buffers: Vec::new(),
                ctrls: None,
                state: RequestState::Idle,
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> RequestState {
        self.lock().state
    }

    pub fn is_complete(&self) -> bool {
        self.state() == RequestState::Complete
    }

    /// Attach a buffer to the request. It reaches its queue when the request
    /// is queued.
    pub fn attach(&self, buf: VideoBuffer) {
        self.lock().buffers.push(buf);
    }

    /// Number of buffers attached and not yet queued
    pub fn buffer_count(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Copy of the control snapshot, if any control was set on this request
    pub fn controls(&self) -> Option<RequestControls> {
        self.lock().ctrls.clone()
    }

    /// Value of one control in the request snapshot
    pub fn control(&self, id: ControlId) -> Option<ControlValue> {
        self.lock().ctrls.as_ref().and_then(|c| c.get(id).cloned())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RequestInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for MediaRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MediaRequest")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("buffers", &inner.buffers.len())
            .field("ctrls", &inner.ctrls)
            .finish()
    }
}
