//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use streams::{
    Capability, Cardinality, Emitter, GrantRequest, GrantState, GrantTable, HostContext, Item,
    Provider, ProviderContext, ProviderDescriptor, ProviderName, QueryError, Source, StageError,
};

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// Host backed by a [`GrantTable`] that records every grant request.
pub struct TestHost {
    pub grants: GrantTable,
    runtime_requests: AtomicBool,
    requests: Mutex<Vec<GrantRequest>>,
}

impl TestHost {
    pub fn new(granted: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            grants: GrantTable::with_granted(granted.iter().map(|c| Capability::from_static(*c))),
            runtime_requests: AtomicBool::new(true),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn without_runtime_requests(granted: &[&'static str]) -> Arc<Self> {
        let host = Self::new(granted);
        host.runtime_requests.store(false, Ordering::SeqCst);
        host
    }

    pub fn requests(&self) -> Vec<GrantRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl GrantState for TestHost {
    fn is_granted(&self, capability: &Capability) -> bool {
        self.grants.is_granted(capability)
    }
}

impl HostContext for TestHost {
    fn supports_runtime_requests(&self) -> bool {
        self.runtime_requests.load(Ordering::SeqCst)
    }

    fn launch_grant_request(&self, request: GrantRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Continuous provider driven by the test: emits `initial` synchronously on
/// start, then whatever the test pushes through [`Scripted::emit`].
pub struct Scripted {
    descriptor: ProviderDescriptor,
    initial: Vec<i64>,
    refuse: Option<&'static str>,
    emitter: Mutex<Option<Emitter>>,
    pub starts: AtomicUsize,
    pub releases: AtomicUsize,
}

impl Scripted {
    pub fn new(required: &[&'static str], initial: Vec<i64>) -> Arc<Self> {
        Self::build(required, initial, None)
    }

    /// A provider whose resource cannot be acquired.
    pub fn refusing(required: &[&'static str], cause: &'static str) -> Arc<Self> {
        Self::build(required, Vec::new(), Some(cause))
    }

    fn build(
        required: &[&'static str],
        initial: Vec<i64>,
        refuse: Option<&'static str>,
    ) -> Arc<Self> {
        let descriptor = required.iter().fold(
            ProviderDescriptor::new(ProviderName::from_static("scripted"), Cardinality::Multi),
            |d, c| d.requiring(Capability::from_static(*c)),
        );
        Arc::new(Self {
            descriptor,
            initial,
            refuse,
            emitter: Mutex::new(None),
            starts: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        })
    }

    pub fn source(self: &Arc<Self>) -> Arc<Source> {
        Source::from_arc(self.clone())
    }

    pub fn emitter(&self) -> Option<Emitter> {
        self.emitter.lock().unwrap().clone()
    }

    pub fn emit(&self, n: i64) -> Result<(), QueryError> {
        match self.emitter() {
            Some(emitter) => emitter.output(Item::new().with("n", n)),
            None => Ok(()),
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl Provider for Scripted {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn provide(&self, ctx: ProviderContext) -> Result<(), QueryError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(cause) = self.refuse {
            return Err(QueryError::provider_failure(self.descriptor.name(), cause));
        }
        for n in &self.initial {
            ctx.emitter().output(Item::new().with("n", *n))?;
        }
        *self.emitter.lock().unwrap() = Some(ctx.into_emitter());
        Ok(())
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.emitter.lock().unwrap().take();
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

pub type Seen = Arc<Mutex<Vec<i64>>>;

/// Returns a shared buffer and a sink callback that appends each item's `n`.
pub fn collector() -> (Seen, impl Fn(&Item) -> Result<(), StageError> + Send + Sync + 'static) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let sink = move |item: &Item| -> Result<(), StageError> {
        let n = item
            .get("n")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| StageError::new("item has no n"))?;
        sink_seen.lock().unwrap().push(n);
        Ok(())
    };
    (seen, sink)
}

pub fn n_of(item: &Item) -> i64 {
    item.get("n").and_then(|v| v.as_i64()).unwrap_or_default()
}
