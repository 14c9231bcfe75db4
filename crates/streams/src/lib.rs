//! Core domain for PrivStreams.
//!
//! This crate contains every domain concept used by the purpose-bound query
//! engine: identifiers, capabilities and purposes, the error taxonomy, the
//! access-grant checker, the provider lifecycle, and the pipeline node chain.
//! Concrete data sources and hosts implement the traits defined here; they never
//! add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* a provider or host must supply; other crates define *how*.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`Capability`, `SourceId`, `GrantRequestId`, etc.) |
//! | [`types`] | Value types (`CapabilitySet`, `Purpose`, `Item`, `Timestamp`) |
//! | [`errors`] | `QueryError`, `StageError`, recorded `Failure` |
//! | [`access`] | Access-grant checker and in-memory `GrantTable` |
//! | [`host`] | Host ports (`HostContext`, `GrantPrompter`) and `ExecutionContext` |
//! | [`lifecycle`] | `Provider` contract, `Source` state machine, `Emitter` |
//! | [`node`] | Pipeline `Node` chain and `Pipeline` |
//! | [`stage`] | `Stage` trait and closure-backed stages |

pub mod access;
pub mod errors;
pub mod host;
pub mod identifiers;
pub mod lifecycle;
pub mod node;
pub mod stage;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use access::{all_granted, check, missing, GrantState, GrantTable};
pub use errors::{Failure, QueryError, StageError};
pub use host::{ExecutionContext, GrantDecision, GrantPrompter, GrantRequest, HostContext};
pub use identifiers::{
    Capability, GrantRequestId, NodeId, ProviderName, QueryId, SessionId, SourceId, StageName,
};
pub use lifecycle::{
    Emitter, Provider, ProviderContext, ProviderDescriptor, ProviderState, Source,
};
pub use node::{Node, NodeState, Pipeline, PipelineDescription};
pub use stage::{Filter, ForEach, Map, Stage};
pub use types::{CapabilitySet, Cardinality, Item, Purpose, PurposeCategory, Timestamp};
