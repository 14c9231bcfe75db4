//! Integration tests for permission-gated evaluation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{collector, n_of, Scripted, TestHost};
use engine::{EngineConfig, Evaluation, QueryEngine};
use streams::{
    Capability, CapabilitySet, GrantRequest, GrantState, HostContext, NodeState, ProviderState,
    Purpose, QueryError, StageError,
};

fn caps(names: &[&'static str]) -> CapabilitySet {
    names.iter().map(|c| Capability::from_static(*c)).collect()
}

#[test]
fn granted_pipeline_executes_once_and_records_nothing() {
    let host = TestHost::new(&["ACCESS_FINE_LOCATION"]);
    let engine = QueryEngine::new(host.clone(), EngineConfig::default());
    let provider = Scripted::new(&["ACCESS_FINE_LOCATION"], vec![1, 2]);
    let (seen, sink) = collector();

    let pipeline = engine
        .get_data(&provider.source(), Purpose::feature("track a run"))
        .sink(streams::ForEach::new("collect", sink));
    let outcome = engine.evaluate(&pipeline, false).unwrap();

    assert_eq!(outcome, Evaluation::Executed);
    assert_eq!(provider.starts(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    assert_eq!(engine.last_failure(), None);
    assert!(host.requests().is_empty());
}

#[test]
fn missing_capability_without_retry_is_denied_and_cancelled() {
    let host = TestHost::new(&["CONTACTS"]);
    let engine = QueryEngine::new(host, EngineConfig::default());
    let provider = Scripted::new(&["ACCESS_FINE_LOCATION", "CONTACTS"], vec![1]);
    let source = provider.source();
    let pipeline = engine
        .get_data(&source, Purpose::feature("nearby friends"))
        .into_pipeline();

    let outcome = engine.evaluate(&pipeline, false).unwrap();

    let missing = caps(&["ACCESS_FINE_LOCATION"]);
    assert_eq!(outcome, Evaluation::Denied { missing: missing.clone() });
    let failure = engine.last_failure().unwrap();
    assert_eq!(failure.error, QueryError::PermissionDenied { missing });
    assert_eq!(failure.query, Some(pipeline.id()));
    assert_eq!(pipeline.state(), NodeState::Cancelled);
    assert_eq!(source.state(), ProviderState::Cancelled);
    assert_eq!(provider.starts(), 0);
}

#[test]
fn missing_capability_with_retry_delegates_exactly_once() {
    let host = TestHost::new(&[]);
    let engine = QueryEngine::new(host.clone(), EngineConfig::default());
    let provider = Scripted::new(&["ACCESS_FINE_LOCATION"], vec![1]);
    let pipeline = engine
        .get_data(&provider.source(), Purpose::health("step counter"))
        .into_pipeline();

    let outcome = engine.evaluate(&pipeline, true).unwrap();

    let requests = host.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(outcome, Evaluation::AwaitingGrant(requests[0].id));
    assert_eq!(requests[0].missing, caps(&["ACCESS_FINE_LOCATION"]));
    assert_eq!(requests[0].purpose, Some(Purpose::health("step counter")));
    assert_eq!(engine.pending_grant_requests(), vec![requests[0].id]);
    assert_eq!(engine.last_failure(), None);
    assert_eq!(provider.starts(), 0);
    assert_eq!(pipeline.state(), NodeState::Idle);
}

#[test]
fn resolved_grant_runs_the_parked_pipeline() {
    let host = TestHost::new(&[]);
    let engine = QueryEngine::new(host.clone(), EngineConfig::default());
    let provider = Scripted::new(&["CAMERA"], vec![5]);
    let (seen, sink) = collector();
    let pipeline = engine
        .get_data(&provider.source(), Purpose::social("profile photo"))
        .for_each("collect", sink)
        .unwrap();
    let request = host.requests().remove(0);

    host.grants.grant(Capability::from_static("CAMERA"));
    let outcome = engine.resolve_grant_request(request.id).unwrap();

    assert_eq!(outcome, Evaluation::Executed);
    assert_eq!(*seen.lock().unwrap(), vec![5]);
    assert_eq!(pipeline.state(), NodeState::Running);
    assert!(engine.pending_grant_requests().is_empty());
    assert_eq!(
        engine.resolve_grant_request(request.id),
        Err(QueryError::UnknownGrantRequest { id: request.id })
    );
}

#[test]
fn refused_grant_records_permission_denied() {
    let host = TestHost::new(&[]);
    let engine = QueryEngine::new(host.clone(), EngineConfig::default());
    let provider = Scripted::new(&["MICROPHONE"], vec![]);
    let pipeline = engine
        .get_data(&provider.source(), Purpose::utility("voice memo"))
        .into_pipeline();
    engine.evaluate(&pipeline, true).unwrap();
    let request = host.requests().remove(0);

    let outcome = engine.resolve_grant_request(request.id).unwrap();

    assert_eq!(
        outcome,
        Evaluation::Denied {
            missing: caps(&["MICROPHONE"])
        }
    );
    assert_eq!(pipeline.state(), NodeState::Cancelled);
    assert!(matches!(
        engine.last_failure().map(|f| f.error),
        Some(QueryError::PermissionDenied { .. })
    ));
}

#[test]
fn host_without_runtime_requests_denies_synchronously() {
    let host = TestHost::without_runtime_requests(&[]);
    let engine = QueryEngine::new(host.clone(), EngineConfig::default());
    let provider = Scripted::new(&["ACCESS_FINE_LOCATION"], vec![]);
    let pipeline = engine
        .get_data(&provider.source(), Purpose::feature("map"))
        .into_pipeline();

    let outcome = engine.evaluate(&pipeline, true).unwrap();

    assert_eq!(
        outcome,
        Evaluation::Denied {
            missing: caps(&["ACCESS_FINE_LOCATION"])
        }
    );
    assert!(host.requests().is_empty());
    assert!(engine.pending_grant_requests().is_empty());
    assert_eq!(pipeline.state(), NodeState::Cancelled);
}

#[test]
fn head_without_requirements_runs_transform_and_sink() {
    let engine = QueryEngine::new(TestHost::new(&[]), EngineConfig::default());
    let provider = Scripted::new(&[], vec![1, 2, 3]);
    let (seen, sink) = collector();

    let pipeline = engine
        .get_data(&provider.source(), Purpose::analytics("usage"))
        .map("square", |item| {
            let n = n_of(&item);
            Ok(item.with("n", n * n))
        })
        .sink(streams::ForEach::new("collect", sink));

    assert_eq!(engine.evaluate(&pipeline, false).unwrap(), Evaluation::Executed);
    assert_eq!(*seen.lock().unwrap(), vec![1, 4, 9]);
    assert_eq!(engine.last_failure(), None);
}

#[test]
fn stage_requirements_join_the_head_requirements() {
    let host = TestHost::new(&["ACCESS_COARSE_LOCATION"]);
    let engine = QueryEngine::new(host, EngineConfig::default());
    let provider = Scripted::new(&["ACCESS_COARSE_LOCATION"], vec![1]);

    let pipeline = engine
        .get_data(&provider.source(), Purpose::ads("local offers"))
        .then(
            streams::Map::new("enrich", Ok).requiring(Capability::from_static("CONTACTS")),
        )
        .into_pipeline();

    assert_eq!(
        engine.evaluate(&pipeline, false).unwrap(),
        Evaluation::Denied {
            missing: caps(&["CONTACTS"])
        }
    );
    assert_eq!(provider.starts(), 0);
}

#[test]
fn execution_errors_propagate_and_are_not_recorded() {
    let engine = QueryEngine::new(TestHost::new(&[]), EngineConfig::default());
    let provider = Scripted::new(&[], vec![1]);
    let pipeline = engine
        .get_data(&provider.source(), Purpose::research("survey"))
        .map("reject", |_item| Err(StageError::new("malformed")))
        .into_pipeline();

    let err = engine.evaluate(&pipeline, false).unwrap_err();

    assert!(matches!(err, QueryError::Execution { ref message, .. } if message == "malformed"));
    assert_eq!(engine.last_failure(), None);
    assert_eq!(pipeline.state(), NodeState::Failed);
    assert_eq!(provider.releases(), 1);
}

#[test]
fn provider_failure_after_start_stays_with_the_source() {
    let engine = QueryEngine::new(TestHost::new(&["ACCESS_FINE_LOCATION"]), EngineConfig::default());
    let provider = Scripted::new(&["ACCESS_FINE_LOCATION"], vec![1]);
    let source = provider.source();
    let (seen, sink) = collector();
    let pipeline = engine
        .get_data(&source, Purpose::feature("navigation"))
        .sink(streams::ForEach::new("collect", sink));
    assert_eq!(engine.evaluate(&pipeline, false).unwrap(), Evaluation::Executed);

    provider.emitter().unwrap().fail("connection refused");
    provider.emit(2).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![1]);
    assert_eq!(source.state(), ProviderState::Failed);
    assert!(matches!(
        source.failure(),
        Some(QueryError::ProviderFailure { ref cause, .. }) if cause == "connection refused"
    ));
    assert_eq!(pipeline.state(), NodeState::Failed);
    assert_eq!(engine.last_failure(), None);
    assert_eq!(provider.releases(), 1);
    assert!(provider.emitter().is_none());
}

#[test]
fn provider_failing_to_start_does_not_fail_evaluation() {
    let engine = QueryEngine::new(TestHost::new(&[]), EngineConfig::default());
    let provider = Scripted::refusing(&[], "service unavailable");
    let source = provider.source();
    let pipeline = engine
        .get_data(&source, Purpose::feature("weather"))
        .map("noop", Ok)
        .into_pipeline();

    let outcome = engine.evaluate(&pipeline, false).unwrap();

    assert_eq!(outcome, Evaluation::Executed);
    assert_eq!(provider.starts(), 1);
    assert_eq!(source.state(), ProviderState::Failed);
    assert!(matches!(source.failure(), Some(QueryError::ProviderFailure { .. })));
    assert!(pipeline.nodes().iter().all(|n| n.state() == NodeState::Failed));
    assert_eq!(engine.last_failure(), None);
    assert_eq!(provider.releases(), 1);
}

#[test]
fn filter_drops_items_before_the_sink() {
    let engine = QueryEngine::new(TestHost::new(&[]), EngineConfig::default());
    let provider = Scripted::new(&[], vec![1, 2, 3, 4]);
    let (seen, sink) = collector();

    engine
        .get_data(&provider.source(), Purpose::feature("even only"))
        .filter("even", |item| n_of(item) % 2 == 0)
        .for_each("collect", sink)
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![2, 4]);
}

#[test]
fn latest_registration_is_the_purpose_reported_at_evaluation() {
    let engine = QueryEngine::new(TestHost::new(&[]), EngineConfig::default());
    let source = Scripted::new(&[], vec![]).source();

    let _ = engine.get_data(&source, Purpose::feature("q1"));
    let pipeline = engine
        .get_data(&source, Purpose::analytics("q2"))
        .into_pipeline();
    engine.evaluate(&pipeline, false).unwrap();

    assert_eq!(engine.purpose_of(&pipeline), Some(Purpose::analytics("q2")));
}

// ---------------------------------------------------------------------------
// Asynchronous resolution
// ---------------------------------------------------------------------------

/// Host that forwards grant requests to an async task, like a real UI would.
struct ChannelHost {
    grants: streams::GrantTable,
    requests: tokio::sync::mpsc::UnboundedSender<GrantRequest>,
}

impl GrantState for ChannelHost {
    fn is_granted(&self, capability: &Capability) -> bool {
        self.grants.is_granted(capability)
    }
}

impl HostContext for ChannelHost {
    fn supports_runtime_requests(&self) -> bool {
        true
    }

    fn launch_grant_request(&self, request: GrantRequest) {
        let _ = self.requests.send(request);
    }
}

#[tokio::test]
async fn grant_resolved_later_on_another_task_executes_the_pipeline() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let host = Arc::new(ChannelHost {
        grants: streams::GrantTable::new(),
        requests: tx,
    });
    let engine = QueryEngine::new(host.clone(), EngineConfig::default());
    let provider = Scripted::new(&["ACCESS_FINE_LOCATION"], vec![42]);
    let (seen, sink) = collector();

    let pipeline = engine
        .get_data(&provider.source(), Purpose::feature("find my phone"))
        .for_each("collect", sink)
        .unwrap();
    assert!(seen.lock().unwrap().is_empty());

    let prompt_engine = Arc::clone(&engine);
    let prompt = tokio::spawn(async move {
        let request = rx.recv().await.expect("grant request");
        tokio::time::sleep(Duration::from_millis(10)).await;
        for capability in request.missing.iter() {
            host.grants.grant(capability.clone());
        }
        prompt_engine.resolve_grant_request(request.id)
    });

    let outcome = prompt.await.unwrap().unwrap();

    assert_eq!(outcome, Evaluation::Executed);
    assert_eq!(*seen.lock().unwrap(), vec![42]);
    assert_eq!(pipeline.state(), NodeState::Running);
}
