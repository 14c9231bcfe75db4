//! Provider lifecycle.
//!
//! Every data source implements [`Provider`]. The framework wraps it in a
//! [`Source`], which owns the lifecycle state machine, so individual providers
//! never track state themselves:
//!
//! ```text
//! Created ──start──▶ Providing ──first item──▶ Emitting ──item──▶ Emitting
//!    │                  │  │                     │  │
//!    │                  │  └──────fail───────────┼──┴──▶ Failed
//!    │                  └──finish────────────────┴─────▶ Finished
//!    └──────────── cancel (from any non-terminal state) ─▶ Cancelled
//! ```
//!
//! Providers push items through an [`Emitter`], typically from a callback thread
//! owned by their external resource. Emissions that arrive after a terminal
//! state are dropped, so a cancelled provider never delivers a new item once
//! cancellation has completed. One item already in transit when cancellation
//! starts may still be delivered.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::{Node, NodeState};
use crate::{
    Capability, CapabilitySet, Cardinality, ExecutionContext, HostContext, Item, ProviderName,
    QueryError, SessionId, SourceId,
};

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`Source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    /// Constructed; parameters validated; nothing acquired yet.
    Created,
    /// External resource acquisition has been requested.
    Providing,
    /// At least one item has been pushed downstream.
    Emitting,
    /// Terminal: the provider completed normally.
    Finished,
    /// Terminal: the provider was stopped externally.
    Cancelled,
    /// Terminal: the external resource reported an unrecoverable error, or a
    /// downstream stage failed while processing an emitted item.
    Failed,
}

impl ProviderState {
    /// Returns `true` for `Finished`, `Cancelled` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Failed)
    }

    /// Returns `true` if the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: ProviderState) -> bool {
        use ProviderState::*;
        match (self, next) {
            (Created, Providing) => true,
            (Providing | Emitting, Emitting) => true,
            (Providing | Emitting, Finished | Failed) => true,
            (current, Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl From<ProviderState> for NodeState {
    fn from(state: ProviderState) -> Self {
        match state {
            ProviderState::Created => NodeState::Idle,
            ProviderState::Providing | ProviderState::Emitting => NodeState::Running,
            ProviderState::Finished => NodeState::Finished,
            ProviderState::Cancelled => NodeState::Cancelled,
            ProviderState::Failed => NodeState::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Static description of a provider: what it is, what it needs, how it was
/// configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    name: ProviderName,
    cardinality: Cardinality,
    parameters: BTreeMap<String, Value>,
    required: CapabilitySet,
}

impl ProviderDescriptor {
    /// Creates a descriptor with no parameters and no required capabilities.
    pub fn new(name: ProviderName, cardinality: Cardinality) -> Self {
        Self {
            name,
            cardinality,
            parameters: BTreeMap::new(),
            required: CapabilitySet::new(),
        }
    }

    /// Records a construction parameter (for diagnostics).
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Declares a capability the provider needs.
    #[must_use]
    pub fn requiring(mut self, capability: Capability) -> Self {
        self.required.insert(capability);
        self
    }

    /// The provider's name.
    pub fn name(&self) -> &ProviderName {
        &self.name
    }

    /// Single-shot or continuous.
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Construction parameters.
    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    /// Capabilities the provider needs to run.
    pub fn required_capabilities(&self) -> &CapabilitySet {
        &self.required
    }
}

// ---------------------------------------------------------------------------
// Provider contract
// ---------------------------------------------------------------------------

/// A data source.
///
/// Construction validates parameters and declares required capabilities via
/// [`Provider::descriptor`]. The framework guarantees `provide` is called at
/// most once per [`Source`].
pub trait Provider: Send + Sync + 'static {
    /// Describes the provider.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Begins acquiring the external resource.
    ///
    /// May emit synchronously through `ctx.emitter()` or keep the emitter and
    /// emit later from another thread. Return [`QueryError::ProviderFailure`]
    /// if the resource cannot be acquired; any other error is propagated to
    /// whoever started the pipeline.
    fn provide(&self, ctx: ProviderContext) -> Result<(), QueryError>;

    /// Notification that the source was cancelled. Runs before
    /// [`Provider::release`].
    fn on_cancelled(&self) {}

    /// Releases every acquired resource.
    ///
    /// Invoked exactly once, when the source reaches any terminal state:
    /// finished, failed or cancelled. Must be safe to call even if `provide`
    /// never ran or is still running. The source is already terminal when this
    /// runs; emissions are ignored. A provider that keeps its [`Emitter`] must
    /// drop it here, since the emitter keeps the source alive.
    fn release(&self) {}
}

/// What a provider receives when it is started.
pub struct ProviderContext {
    execution: ExecutionContext,
    emitter: Emitter,
}

impl ProviderContext {
    pub(crate) fn new(execution: ExecutionContext, emitter: Emitter) -> Self {
        Self { execution, emitter }
    }

    /// The handle for pushing items downstream.
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Takes ownership of the emitter, e.g. to hand it to a callback.
    pub fn into_emitter(self) -> Emitter {
        self.emitter
    }

    /// The host authority of the engine running this provider.
    pub fn host(&self) -> &Arc<dyn HostContext> {
        self.execution.host()
    }

    /// The engine session running this provider.
    pub fn session(&self) -> SessionId {
        self.execution.session()
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SourceInner {
    state: ProviderState,
    subscribers: Vec<Weak<Node>>,
    emitted: u64,
    failure: Option<QueryError>,
}

/// The framework-owned runtime of a pipeline head.
///
/// Each `Source` has a unique [`SourceId`]; the engine's purpose registry is
/// keyed by it. Share a source with `Arc` to build several pipelines from the
/// same declared head.
pub struct Source {
    id: SourceId,
    provider: Arc<dyn Provider>,
    inner: Mutex<SourceInner>,
}

impl Source {
    /// Wraps a provider in a new source with a fresh identity.
    pub fn new(provider: impl Provider) -> Arc<Self> {
        Self::from_arc(Arc::new(provider))
    }

    /// Wraps an already shared provider in a new source with a fresh identity.
    pub fn from_arc(provider: Arc<dyn Provider>) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::next(),
            provider,
            inner: Mutex::new(SourceInner {
                state: ProviderState::Created,
                subscribers: Vec::new(),
                emitted: 0,
                failure: None,
            }),
        })
    }

    /// The head identity.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// The provider's descriptor.
    pub fn descriptor(&self) -> &ProviderDescriptor {
        self.provider.descriptor()
    }

    /// The provider's name.
    pub fn name(&self) -> &ProviderName {
        self.provider.descriptor().name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProviderState {
        self.lock().state
    }

    /// Number of items accepted for delivery so far.
    pub fn emitted(&self) -> u64 {
        self.lock().emitted
    }

    /// The error that moved this source to `Failed`, if any.
    pub fn failure(&self) -> Option<QueryError> {
        self.lock().failure.clone()
    }

    /// Cancels the source. Returns `false` if it was already terminal.
    ///
    /// Moves to `Cancelled` first, so no further emission is accepted, then
    /// lets the provider release its resources.
    pub fn cancel(&self) -> bool {
        self.terminate(ProviderState::Cancelled, None)
    }

    fn lock(&self) -> MutexGuard<'_, SourceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a head node for delivery.
    ///
    /// A node attached to an already terminal source is told immediately.
    pub(crate) fn attach(&self, node: &Arc<Node>) {
        let terminal = {
            let mut inner = self.lock();
            inner.subscribers.retain(|s| s.strong_count() > 0);
            if inner.state.is_terminal() {
                Some(inner.state)
            } else {
                inner.subscribers.push(Arc::downgrade(node));
                None
            }
        };
        if let Some(state) = terminal {
            node.upstream_terminated(state.into());
        }
    }

    /// Starts the provider unless it has already been started.
    pub(crate) fn start(self: &Arc<Self>, ctx: &ExecutionContext) -> Result<(), QueryError> {
        {
            let mut inner = self.lock();
            match inner.state {
                ProviderState::Created => {
                    tracing::debug!(
                        source = %self.id,
                        provider = %self.name(),
                        from = ?ProviderState::Created,
                        to = ?ProviderState::Providing,
                        "Provider state transition"
                    );
                    inner.state = ProviderState::Providing;
                }
                state => {
                    tracing::debug!(source = %self.id, ?state, "Provider already started");
                    return Ok(());
                }
            }
        }

        let emitter = Emitter {
            source: Arc::clone(self),
        };
        match self.provider.provide(ProviderContext::new(ctx.clone(), emitter)) {
            Ok(()) => Ok(()),
            Err(err @ QueryError::ProviderFailure { .. }) => {
                tracing::warn!(source = %self.id, error = %err, "Provider failed to start");
                self.terminate(ProviderState::Failed, Some(err));
                Ok(())
            }
            Err(err) => {
                self.terminate(ProviderState::Failed, Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Moves to a terminal state, releases the provider and notifies the
    /// attached nodes. Only the first terminal transition has any effect.
    fn terminate(&self, next: ProviderState, failure: Option<QueryError>) -> bool {
        let subscribers = {
            let mut inner = self.lock();
            if !inner.state.can_transition_to(next) {
                return false;
            }
            tracing::debug!(
                source = %self.id,
                provider = %self.name(),
                from = ?inner.state,
                to = ?next,
                "Provider state transition"
            );
            inner.state = next;
            if failure.is_some() {
                inner.failure = failure;
            }
            std::mem::take(&mut inner.subscribers)
        };

        if next == ProviderState::Cancelled {
            self.provider.on_cancelled();
        }
        self.provider.release();
        for node in subscribers.iter().filter_map(Weak::upgrade) {
            node.upstream_terminated(next.into());
        }
        true
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("provider", self.name())
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Handle a provider uses to push items and report completion.
///
/// Cheap to clone and safe to use from any thread.
#[derive(Clone)]
pub struct Emitter {
    source: Arc<Source>,
}

impl Emitter {
    /// Pushes one item downstream.
    ///
    /// Items are delivered in call order. After a terminal state the item is
    /// dropped and `Ok(())` is returned. If a downstream stage fails, the source
    /// moves to `Failed`, its resources are released, and the stage's error is
    /// returned.
    pub fn output(&self, item: Item) -> Result<(), QueryError> {
        let source = &self.source;
        let subscribers = {
            let mut inner = source.lock();
            match inner.state {
                ProviderState::Providing => {
                    tracing::debug!(
                        source = %source.id,
                        provider = %source.name(),
                        from = ?ProviderState::Providing,
                        to = ?ProviderState::Emitting,
                        "Provider state transition"
                    );
                    inner.state = ProviderState::Emitting;
                }
                ProviderState::Emitting => {}
                state => {
                    tracing::trace!(source = %source.id, ?state, "Dropping emission");
                    return Ok(());
                }
            }
            inner.emitted += 1;
            inner
                .subscribers
                .iter()
                .filter_map(Weak::upgrade)
                .collect::<Vec<_>>()
        };

        for node in subscribers {
            if let Err(err) = node.push(item.clone()) {
                source.terminate(ProviderState::Failed, Some(err.clone()));
                return Err(err);
            }
        }

        if source.descriptor().cardinality() == Cardinality::Single {
            self.finish();
        }
        Ok(())
    }

    /// Signals normal completion and releases the provider. Ignored once
    /// terminal.
    pub fn finish(&self) {
        self.source.terminate(ProviderState::Finished, None);
    }

    /// Signals an unrecoverable resource error and releases the provider.
    /// Ignored once terminal.
    ///
    /// The failure is attributable through [`Source::failure`]; it does not
    /// become an engine-level failure.
    pub fn fail(&self, cause: impl Into<String>) {
        let err = QueryError::provider_failure(self.source.name(), cause);
        tracing::warn!(source = %self.source.id, error = %err, "Provider failed");
        self.source.terminate(ProviderState::Failed, Some(err));
    }

    /// Returns `true` while the source can still deliver items.
    pub fn is_active(&self) -> bool {
        !self.source.state().is_terminal()
    }

    /// The source this emitter feeds.
    pub fn source_id(&self) -> SourceId {
        self.source.id
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter").field("source", &self.source.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_accept_no_transition() {
        for terminal in [
            ProviderState::Finished,
            ProviderState::Cancelled,
            ProviderState::Failed,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(ProviderState::Cancelled));
            assert!(!terminal.can_transition_to(ProviderState::Emitting));
        }
    }

    #[test]
    fn created_can_only_start_or_cancel() {
        let created = ProviderState::Created;
        assert!(created.can_transition_to(ProviderState::Providing));
        assert!(created.can_transition_to(ProviderState::Cancelled));
        assert!(!created.can_transition_to(ProviderState::Emitting));
        assert!(!created.can_transition_to(ProviderState::Finished));
    }

    #[test]
    fn providing_may_finish_without_emitting() {
        assert!(ProviderState::Providing.can_transition_to(ProviderState::Finished));
        assert!(ProviderState::Providing.can_transition_to(ProviderState::Failed));
    }

    #[test]
    fn descriptor_collects_parameters_and_capabilities() {
        let descriptor = ProviderDescriptor::new(
            ProviderName::from_static("test.provider"),
            Cardinality::Multi,
        )
        .with_parameter("interval", 1000)
        .requiring(Capability::from_static("A"))
        .requiring(Capability::from_static("A"));

        assert_eq!(descriptor.parameters().get("interval"), Some(&Value::from(1000)));
        assert_eq!(descriptor.required_capabilities().len(), 1);
    }
}
