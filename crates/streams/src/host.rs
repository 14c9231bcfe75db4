//! Host port traits.
//!
//! The host is the external collaborator that owns the real grant state and the
//! UI flow that asks a person for missing capabilities. The engine never blocks
//! on that flow: it hands a [`GrantRequest`] to the host and returns. The host
//! later resolves the request by its [`GrantRequestId`], which re-runs the
//! waiting pipeline with retry disabled.
//!
//! ```text
//! engine ──launch_grant_request(req)──▶ host ──prompt──▶ person
//!    ▲                                                      │
//!    └────────── resolve_grant_request(req.id) ◀────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{CapabilitySet, GrantRequestId, GrantState, Purpose, SessionId, Timestamp};

/// Host-supplied execution authority for one engine instance.
///
/// Shared read-mostly across every pipeline of the engine.
pub trait HostContext: GrantState {
    /// Returns `true` if the host can ask for capabilities while running.
    ///
    /// Hosts that cannot prompt at runtime make the engine re-evaluate
    /// immediately with retry disabled.
    fn supports_runtime_requests(&self) -> bool;

    /// Starts the flow that asks for `request.missing`.
    ///
    /// Must not block waiting for the decision. Once the decision is known the
    /// host calls the engine's `resolve_grant_request(request.id)`.
    fn launch_grant_request(&self, request: GrantRequest);
}

/// A request for capabilities that a pipeline is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRequest {
    /// Correlation key for resolving the request.
    pub id: GrantRequestId,
    /// The capabilities that were missing at evaluation time.
    pub missing: CapabilitySet,
    /// The purpose declared for the pipeline's head, if registered.
    pub purpose: Option<Purpose>,
    /// When the request was issued.
    pub requested_at: Timestamp,
}

/// The outcome of asking for capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantDecision {
    /// The listed capabilities were granted.
    Granted(CapabilitySet),
    /// The request was refused.
    Denied,
}

/// The human side of a grant request.
///
/// Implemented by hosts; the decision may take arbitrarily long.
#[async_trait]
pub trait GrantPrompter: Send + Sync {
    /// Asks for the capabilities in `request` and returns the decision.
    async fn prompt(&self, request: &GrantRequest) -> GrantDecision;
}

/// Ambient context passed down a pipeline when it is applied.
#[derive(Clone)]
pub struct ExecutionContext {
    session: SessionId,
    host: Arc<dyn HostContext>,
}

impl ExecutionContext {
    /// Creates a context for one engine session.
    pub fn new(session: SessionId, host: Arc<dyn HostContext>) -> Self {
        Self { session, host }
    }

    /// The engine session this context belongs to.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// The host authority.
    pub fn host(&self) -> &Arc<dyn HostContext> {
        &self.host
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
