//! Console host: grant state for the process plus terminal prompts.
//!
//! The engine's [`HostContext::launch_grant_request`] must return immediately,
//! so [`ConsoleHost`] only queues the request. [`spawn_grant_loop`] answers
//! queued requests one at a time through a [`GrantPrompter`], records what was
//! granted, and hands the decision back to the engine.

use std::sync::Arc;

use async_trait::async_trait;
use engine::QueryEngine;
use streams::{
    Capability, GrantDecision, GrantPrompter, GrantRequest, GrantState, GrantTable, HostContext,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::PromptMode;

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

pub struct ConsoleHost {
    grants: GrantTable,
    runtime_requests: bool,
    requests: mpsc::UnboundedSender<GrantRequest>,
}

impl ConsoleHost {
    /// Returns the host and the queue its grant requests arrive on.
    pub fn new(
        grants: GrantTable,
        runtime_requests: bool,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<GrantRequest>) {
        let (requests, queue) = mpsc::unbounded_channel();
        let host = Arc::new(Self {
            grants,
            runtime_requests,
            requests,
        });
        (host, queue)
    }

    pub fn grants(&self) -> &GrantTable {
        &self.grants
    }
}

impl GrantState for ConsoleHost {
    fn is_granted(&self, capability: &Capability) -> bool {
        self.grants.is_granted(capability)
    }
}

impl HostContext for ConsoleHost {
    fn supports_runtime_requests(&self) -> bool {
        self.runtime_requests
    }

    fn launch_grant_request(&self, request: GrantRequest) {
        let id = request.id;
        if self.requests.send(request).is_err() {
            tracing::warn!(request = %id, "Grant loop has stopped; request will never resolve");
        }
    }
}

/// Answers queued grant requests until the queue closes.
pub fn spawn_grant_loop(
    engine: Arc<QueryEngine>,
    host: Arc<ConsoleHost>,
    prompter: Arc<dyn GrantPrompter>,
    mut queue: mpsc::UnboundedReceiver<GrantRequest>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = queue.recv().await {
            let span = tracing::info_span!(
                "grant_request",
                request = %request.id,
                missing = %request.missing
            );
            answer(&engine, &host, prompter.as_ref(), request)
                .instrument(span)
                .await;
        }
    })
}

async fn answer(
    engine: &QueryEngine,
    host: &ConsoleHost,
    prompter: &dyn GrantPrompter,
    request: GrantRequest,
) {
    match prompter.prompt(&request).await {
        GrantDecision::Granted(capabilities) => {
            tracing::info!(granted = %capabilities, "Capabilities granted");
            host.grants().grant_all(capabilities);
        }
        GrantDecision::Denied => tracing::info!("Grant request refused"),
    }

    match engine.resolve_grant_request(request.id) {
        Ok(outcome) => tracing::debug!(?outcome, "Grant request resolved"),
        Err(err) => tracing::warn!(error = %err, "Grant request could not be resolved"),
    }
}

// ---------------------------------------------------------------------------
// Prompters
// ---------------------------------------------------------------------------

/// Builds the prompter for `mode`.
pub fn prompter(mode: PromptMode) -> Arc<dyn GrantPrompter> {
    match mode {
        PromptMode::Approve => Arc::new(ApproveAll),
        PromptMode::Deny => Arc::new(DenyAll),
        PromptMode::Interactive => Arc::new(StdinPrompter::new()),
    }
}

pub struct ApproveAll;

#[async_trait]
impl GrantPrompter for ApproveAll {
    async fn prompt(&self, request: &GrantRequest) -> GrantDecision {
        GrantDecision::Granted(request.missing.clone())
    }
}

pub struct DenyAll;

#[async_trait]
impl GrantPrompter for DenyAll {
    async fn prompt(&self, _request: &GrantRequest) -> GrantDecision {
        GrantDecision::Denied
    }
}

/// Asks on stderr and reads `y`/`n` from stdin. Anything but `y`/`yes`
/// (including end of input) is a refusal.
pub struct StdinPrompter {
    stdin: Mutex<BufReader<tokio::io::Stdin>>,
}

impl StdinPrompter {
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for StdinPrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrantPrompter for StdinPrompter {
    async fn prompt(&self, request: &GrantRequest) -> GrantDecision {
        let purpose = request
            .purpose
            .as_ref()
            .map(|p| format!(" for {p}"))
            .unwrap_or_default();
        eprint!("Allow access to {}{purpose}? [y/N] ", request.missing);

        let mut line = String::new();
        let read = self.stdin.lock().await.read_line(&mut line).await;
        match read {
            Ok(_) if is_yes(&line) => GrantDecision::Granted(request.missing.clone()),
            Ok(_) => GrantDecision::Denied,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read answer; refusing");
                GrantDecision::Denied
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{EngineConfig, Evaluation};
    use streams::{CapabilitySet, GrantRequestId, Timestamp};

    fn request(missing: &[&'static str]) -> GrantRequest {
        GrantRequest {
            id: GrantRequestId::next(),
            missing: missing.iter().map(|c| Capability::from_static(*c)).collect(),
            purpose: None,
            requested_at: Timestamp::now(),
        }
    }

    #[test]
    fn answers_are_parsed_leniently() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("nope"));
    }

    #[tokio::test]
    async fn approve_all_grants_exactly_what_is_missing() {
        let decision = ApproveAll.prompt(&request(&["CAMERA"])).await;
        assert_eq!(
            decision,
            GrantDecision::Granted(CapabilitySet::single(Capability::from_static("CAMERA")))
        );
    }

    #[tokio::test]
    async fn host_queues_requests_without_blocking() {
        let (host, mut queue) = ConsoleHost::new(GrantTable::new(), true);

        host.launch_grant_request(request(&["CONTACTS"]));

        let queued = queue.recv().await.unwrap();
        assert!(queued.missing.contains(&Capability::from_static("CONTACTS")));
    }

    #[tokio::test]
    async fn grant_loop_grants_and_resolves() {
        let (host, queue) = ConsoleHost::new(GrantTable::new(), true);
        let engine = QueryEngine::new(host.clone(), EngineConfig::default());
        let loop_handle = spawn_grant_loop(
            Arc::clone(&engine),
            Arc::clone(&host),
            prompter(PromptMode::Approve),
            queue,
        );

        let source = streams::Source::new(
            location::LastKnownLocation::new(
                Arc::new(NoFix),
                location::LocationLevel::City,
            ),
        );
        let pipeline = engine
            .get_data(&source, streams::Purpose::feature("weather"))
            .into_pipeline();
        let outcome = engine.evaluate(&pipeline, true).unwrap();
        assert!(matches!(outcome, Evaluation::AwaitingGrant(_)));

        while !engine.pending_grant_requests().is_empty() {
            tokio::task::yield_now().await;
        }
        loop_handle.abort();

        assert!(host
            .grants()
            .is_granted(&Capability::from_static(location::ACCESS_COARSE_LOCATION)));
        assert_eq!(source.state(), streams::ProviderState::Finished);
        assert_eq!(engine.last_failure(), None);
    }

    struct NoFix;

    impl location::LocationService for NoFix {
        fn connect(&self, _listener: Arc<dyn location::LocationListener>) {}
        fn request_updates(&self, _request: location::LocationRequest) {}
        fn remove_updates(&self) {}
        fn disconnect(&self) {}
        fn last_known(&self) -> Option<location::GeoLocation> {
            None
        }
    }
}
