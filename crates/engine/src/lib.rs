//! PrivStreams query engine.
//!
//! Callers declare *why* they want a data source (a [`streams::Purpose`]),
//! build a pipeline from it, and submit that pipeline for evaluation. The
//! engine only runs a pipeline once every capability it needs has been granted
//! by the host, and can stop every pipeline it has seen at once.
//!
//! ```text
//! get_data(source, purpose) ─▶ StreamHandle ─map/filter/…─▶ Pipeline
//!                                                             │
//!                                        evaluate(pipeline, allow_retry)
//!                                                             │
//!                  ┌──────────────── all granted ─────────────┼──── missing ─────────────┐
//!                  ▼                                          │                          ▼
//!              apply()                         allow_retry: ask host,        no retry: record
//!                                              resolve later                 PermissionDenied, cancel
//! ```
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The engine sequences calls between the domain
//! types in [`streams`] and the host's [`streams::HostContext`]. It contains no
//! data-source logic of its own.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`engine`] | `QueryEngine`, purpose registry, evaluation, `stop_all` |
//! | [`grant`] | Grant-request continuations keyed by `GrantRequestId` |
//! | [`stream`] | `StreamHandle` pipeline builder |
//! | [`config`] | `EngineConfig` |

pub mod config;
pub mod engine;
pub mod grant;
pub mod stream;

pub use config::{EngineConfig, DEFAULT_INTERRUPT_REASON};
pub use engine::{Evaluation, QueryEngine};
pub use stream::StreamHandle;
