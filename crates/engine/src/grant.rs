//! Grant-request continuations.
//!
//! When evaluation with retry finds missing capabilities, the pipeline is parked
//! under a fresh [`GrantRequestId`] and the host is asked to prompt for them.
//! The engine does not wait. Whenever the host has a decision (seconds or
//! minutes later, on any thread) it calls
//! [`QueryEngine::resolve_grant_request`], which re-evaluates the parked
//! pipeline with retry disabled: granted capabilities run it, anything still
//! missing records `PermissionDenied` and cancels it.
//!
//! Hosts that cannot prompt at runtime get the retry-disabled evaluation
//! immediately.

use streams::{CapabilitySet, GrantRequest, GrantRequestId, Pipeline, Purpose, QueryError, Timestamp};

use crate::{Evaluation, QueryEngine};

impl QueryEngine {
    pub(crate) fn request_grant_and_evaluate(
        &self,
        pipeline: &Pipeline,
        missing: CapabilitySet,
        purpose: Option<Purpose>,
    ) -> Result<Evaluation, QueryError> {
        if !self.host().supports_runtime_requests() {
            tracing::debug!("Host cannot request capabilities at runtime; re-evaluating");
            return self.evaluate(pipeline, false);
        }

        let id = GrantRequestId::next();
        self.lock().pending.insert(id, pipeline.clone());
        tracing::debug!(request = %id, query = %pipeline.id(), "Grant request pending");

        self.host().launch_grant_request(GrantRequest {
            id,
            missing,
            purpose,
            requested_at: Timestamp::now(),
        });
        Ok(Evaluation::AwaitingGrant(id))
    }

    /// Re-evaluates the pipeline parked under `id`, with retry disabled.
    ///
    /// Each request resolves at most once. Unknown ids (already resolved, or
    /// dropped by [`QueryEngine::stop_all`]) return
    /// [`QueryError::UnknownGrantRequest`].
    pub fn resolve_grant_request(&self, id: GrantRequestId) -> Result<Evaluation, QueryError> {
        let pipeline = self
            .lock()
            .pending
            .remove(&id)
            .ok_or(QueryError::UnknownGrantRequest { id })?;

        tracing::debug!(request = %id, query = %pipeline.id(), "Grant request resolved");
        self.evaluate(&pipeline, false)
    }

    /// Ids of the grant requests still waiting for the host, oldest first.
    pub fn pending_grant_requests(&self) -> Vec<GrantRequestId> {
        let mut ids: Vec<_> = self.lock().pending.keys().copied().collect();
        ids.sort();
        ids
    }
}
