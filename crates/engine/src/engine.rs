//! The query engine.
//!
//! One [`QueryEngine`] exists per logical host session. It owns:
//!
//! - the purpose registry, keyed by head identity ([`SourceId`]), not by value;
//! - the set of every pipeline ever submitted, for [`QueryEngine::stop_all`];
//! - the most recent terminal [`Failure`] (one slot, overwritten);
//! - the pending grant requests (see [`crate::grant`]).
//!
//! All four live behind a single mutex. Every mutation is one short critical
//! section, and the lock is never held while a pipeline is applied or cancelled,
//! because providers call back into pipelines from their own threads.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use streams::{
    access, CapabilitySet, ExecutionContext, Failure, GrantRequestId, HostContext, Pipeline,
    Purpose, QueryError, QueryId, SessionId, Source, SourceId,
};

use crate::{EngineConfig, StreamHandle};

/// Outcome of [`QueryEngine::evaluate`] when no execution error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Every required capability was granted and the pipeline was applied.
    Executed,
    /// Capabilities were missing; the host was asked for them and will resolve
    /// the request later.
    AwaitingGrant(GrantRequestId),
    /// Capabilities were missing and retry was disabled. `PermissionDenied` was
    /// recorded and the pipeline cancelled.
    Denied {
        /// The capabilities that were not granted.
        missing: CapabilitySet,
    },
}

#[derive(Default)]
pub(crate) struct EngineState {
    purposes: HashMap<SourceId, Purpose>,
    queries: Vec<Pipeline>,
    query_ids: HashSet<QueryId>,
    last_failure: Option<Failure>,
    pub(crate) pending: HashMap<GrantRequestId, Pipeline>,
}

/// Purpose-bound, permission-gated pipeline executor.
pub struct QueryEngine {
    context: ExecutionContext,
    config: EngineConfig,
    state: Mutex<EngineState>,
}

impl QueryEngine {
    /// Creates an engine for one host session.
    pub fn new(host: Arc<dyn HostContext>, config: EngineConfig) -> Arc<Self> {
        let session = SessionId::new_random();
        tracing::debug!(%session, "Query engine created");
        Arc::new(Self {
            context: ExecutionContext::new(session, host),
            config,
            state: Mutex::new(EngineState::default()),
        })
    }

    /// The session this engine belongs to.
    pub fn session(&self) -> SessionId {
        self.context.session()
    }

    /// The configuration the engine was created with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The host authority.
    pub fn host(&self) -> &Arc<dyn HostContext> {
        self.context.host()
    }

    // -----------------------------------------------------------------------
    // Purpose registry
    // -----------------------------------------------------------------------

    /// Declares why `source` is accessed and returns a handle for building
    /// pipelines from it.
    ///
    /// Registering the same source again replaces the previous purpose.
    pub fn get_data(self: &Arc<Self>, source: &Arc<Source>, purpose: Purpose) -> StreamHandle {
        self.register(source, purpose);
        StreamHandle::new(Arc::clone(self), Arc::clone(source))
    }

    fn register(&self, source: &Source, purpose: Purpose) {
        let previous = self.lock().purposes.insert(source.id(), purpose.clone());
        match previous {
            Some(previous) if previous != purpose => tracing::warn!(
                source = %source.id(),
                provider = %source.name(),
                %previous,
                %purpose,
                "Head re-registered; replacing its purpose"
            ),
            _ => tracing::debug!(
                source = %source.id(),
                provider = %source.name(),
                %purpose,
                "Purpose registered"
            ),
        }
    }

    /// The purpose registered for `source`.
    pub fn purpose_for(&self, source: &Source) -> Option<Purpose> {
        self.lock().purposes.get(&source.id()).cloned()
    }

    /// The purpose registered for the head of `pipeline`.
    pub fn purpose_of(&self, pipeline: &Pipeline) -> Option<Purpose> {
        self.purpose_for(pipeline.source())
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Checks the capabilities `pipeline` needs and runs it if they are granted.
    ///
    /// - All granted: the pipeline is applied. Errors raised while applying
    ///   are returned unmodified and are not retried.
    /// - Missing, `allow_retry`: the host is asked for them and this returns
    ///   immediately with [`Evaluation::AwaitingGrant`].
    /// - Missing, no retry: `PermissionDenied` is recorded as the last failure
    ///   and the pipeline is cancelled.
    pub fn evaluate(&self, pipeline: &Pipeline, allow_retry: bool) -> Result<Evaluation, QueryError> {
        let span = tracing::info_span!(
            "evaluate",
            session = %self.session(),
            query = %pipeline.id(),
            allow_retry
        );
        let _guard = span.enter();

        let purpose = {
            let mut state = self.lock();
            if state.query_ids.insert(pipeline.id()) {
                state.queries.push(pipeline.clone());
            }
            state.purposes.get(&pipeline.source().id()).cloned()
        };

        let required = pipeline.required_capabilities();
        match &purpose {
            Some(purpose) => tracing::debug!(%purpose, %required, "Evaluating query"),
            None => tracing::debug!(%required, "Evaluating query with no registered purpose"),
        }
        if self.config.trace_descriptions {
            tracing::debug!(description = %pipeline.describe(), "Query description");
        }

        let missing = access::missing(&required, self.host().as_ref());
        if missing.is_empty() {
            tracing::debug!("Capabilities granted; executing");
            pipeline.apply(&self.context)?;
            return Ok(Evaluation::Executed);
        }

        if allow_retry {
            tracing::info!(%missing, "Capabilities missing; requesting grant");
            return self.request_grant_and_evaluate(pipeline, missing, purpose);
        }

        tracing::info!(%missing, "Capabilities missing; cancelling");
        self.record_failure(
            QueryError::PermissionDenied {
                missing: missing.clone(),
            },
            Some(pipeline.id()),
        );
        pipeline.cancel();
        Ok(Evaluation::Denied { missing })
    }

    /// Cancels every pipeline ever submitted to this engine.
    ///
    /// Records an `Interrupted` failure first and drops all pending grant
    /// requests, so a late resolution cannot restart a stopped pipeline.
    pub fn stop_all(&self) {
        let span = tracing::info_span!("stop_all", session = %self.session());
        let _guard = span.enter();

        self.record_failure(
            QueryError::Interrupted {
                reason: self.config.interrupt_reason.clone(),
            },
            None,
        );

        let (queries, dropped) = {
            let mut state = self.lock();
            let dropped = state.pending.len();
            state.pending.clear();
            (state.queries.clone(), dropped)
        };

        tracing::info!(
            queries = queries.len(),
            dropped_grant_requests = dropped,
            "Stopping all queries"
        );
        for query in &queries {
            query.cancel();
        }
    }

    /// The most recently recorded failure.
    ///
    /// Only one failure is kept; capture it right after the call that may have
    /// produced it.
    pub fn last_failure(&self) -> Option<Failure> {
        self.lock().last_failure.clone()
    }

    /// Ids of every pipeline submitted so far, in submission order.
    pub fn submitted_queries(&self) -> Vec<QueryId> {
        self.lock().queries.iter().map(Pipeline::id).collect()
    }

    fn record_failure(&self, error: QueryError, query: Option<QueryId>) {
        let failure = Failure::new(error, query);
        let previous = self.lock().last_failure.replace(failure.clone());
        match previous {
            Some(previous) => tracing::warn!(
                failure = %failure.error,
                previous = %previous.error,
                "Failure recorded; overwriting previous failure"
            ),
            None => tracing::warn!(failure = %failure.error, "Failure recorded"),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("session", &self.session())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
