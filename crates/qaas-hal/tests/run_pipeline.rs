//! End-to-end run pipeline against the in-process service.

use std::sync::Arc;
use std::time::Duration;

use qaas_hal::options::SESSION_KEYS;
use qaas_hal::{
    BackendInfo, BackendVariant, Counts, HalError, InMemoryService, JobState, OptionSet,
    Overrides, Program, QaasBackend, RandomNameGenerator, ScriptedOutcome, Validator,
};

#[derive(Debug)]
struct BatchVariant {
    max_circuits: usize,
}

impl BackendVariant for BatchVariant {
    fn kind(&self) -> &'static str {
        "batch"
    }

    fn type_name(&self) -> &'static str {
        "BatchBackend"
    }

    fn default_options(&self) -> OptionSet {
        OptionSet::new()
            .with_session_defaults("batch-session-from-rust")
            .with("shots", 1000)
            .with("memory", false)
            .with_validator("shots", Validator::int_range(1, 1_000_000))
    }

    fn max_circuits(&self) -> usize {
        self.max_circuits
    }
}

fn backend(service: &Arc<InMemoryService>, max_circuits: usize) -> QaasBackend {
    let info = BackendInfo {
        id: "platform-1".into(),
        name: "batch_simulation_local".into(),
        availability: "available".into(),
        version: "1.0".into(),
        num_qubits: 8,
        metadata: None,
    };
    QaasBackend::new(info, Arc::new(BatchVariant { max_circuits }), service.clone())
        .with_name_generator(Arc::new(RandomNameGenerator::seeded(42)))
        .with_poll_interval(Duration::from_millis(1))
}

fn bell() -> Program {
    Program::qasm2(
        "OPENQASM 2.0;\ninclude \"qelib1.inc\";\nqreg q[2];\ncreg c[2];\nh q[0];\ncx q[0],q[1];\nmeasure q -> c;\n",
    )
}

#[tokio::test]
async fn capacity_exceeded_creates_no_session() {
    let service = Arc::new(InMemoryService::new());
    let backend = backend(&service, 1);

    let err = backend
        .run(vec![bell(), bell()], &Overrides::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HalError::Capacity {
            requested: 2,
            max: 1
        }
    ));
    assert!(err.is_local());
    assert_eq!(service.calls().total(), 0);
    assert_eq!(service.live_session_count().await, 0);
}

#[tokio::test]
async fn out_of_range_shots_cite_the_key() {
    let service = Arc::new(InMemoryService::new());
    let backend = backend(&service, 4);

    let err = backend
        .run(bell(), &Overrides::new().shots(2_000_000))
        .await
        .unwrap_err();

    assert!(matches!(err, HalError::Validation { ref key, .. } if key == "shots"));
    assert!(err.to_string().contains("shots"));
    assert_eq!(service.calls().total(), 0);
}

#[tokio::test]
async fn auto_runs_share_one_session() {
    let service = Arc::new(InMemoryService::new());
    let backend = backend(&service, 4);

    let first = backend
        .run(bell(), &Overrides::new().session_id("auto"))
        .await
        .unwrap();
    let second = backend
        .run(bell(), &Overrides::new().session_id("auto"))
        .await
        .unwrap();

    assert!(first.session_id().is_some());
    assert_eq!(first.session_id(), second.session_id());
    assert_eq!(service.live_session_count().await, 1);
    assert_ne!(first.name(), second.name());
}

#[tokio::test]
async fn falsy_and_uppercase_auto_resolve_automatically() {
    let service = Arc::new(InMemoryService::new());
    let backend = backend(&service, 4);

    let from_false = backend
        .run(bell(), &Overrides::new().set("session_id", false))
        .await
        .unwrap();
    let from_upper = backend
        .run(bell(), &Overrides::new().session_id("AUTO"))
        .await
        .unwrap();

    assert!(from_false.session_id().is_some());
    assert_eq!(from_false.session_id(), from_upper.session_id());
    assert_eq!(service.calls().get_session, 0);
    assert_eq!(service.live_session_count().await, 1);
}

#[tokio::test]
async fn fractional_shots_fail_before_any_remote_call() {
    let service = Arc::new(InMemoryService::new());
    let backend = backend(&service, 4);

    let err = backend
        .run(bell(), &Overrides::new().set("shots", 1500.5))
        .await
        .unwrap_err();
    assert!(matches!(err, HalError::Validation { ref key, .. } if key == "shots"));
    assert_eq!(service.calls().total(), 0);
}

#[tokio::test]
async fn session_keys_never_reach_the_job_payload() {
    let service = Arc::new(InMemoryService::new());
    let backend = backend(&service, 4);

    let overrides = Overrides::new()
        .shots(10)
        .set("session_name", "custom")
        .set("session_max_idle_duration", "5m")
        .set("not_an_option", true);
    let job = backend.run(bell(), &overrides).await.unwrap();

    assert_eq!(job.warnings().len(), 1);
    assert_eq!(job.warnings()[0].key, "not_an_option");

    let submitted = service.submitted_jobs().await;
    assert_eq!(submitted.len(), 1);
    let payload = serde_json::to_value(&submitted[0].config).unwrap();
    for key in SESSION_KEYS {
        assert!(payload.get(key).is_none(), "{key} leaked into the job payload");
    }
    assert_eq!(payload["shots"], 10);
    assert!(payload.get("not_an_option").is_none());
}

#[tokio::test]
async fn explicit_session_must_be_live() {
    let service = Arc::new(InMemoryService::new());
    let backend = backend(&service, 4);

    let session = backend
        .start_session(&backend.session_spec().unwrap().with_deduplication_id("ws"))
        .await
        .unwrap();
    let job = backend
        .run(bell(), &Overrides::new().session_id(session.id.clone()))
        .await
        .unwrap();
    assert_eq!(job.session_id(), Some(session.id.as_str()));

    backend.stop_session(&session.id).await.unwrap();
    let err = backend
        .run(bell(), &Overrides::new().session_id(session.id.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, HalError::Session(_)));

    backend.stop_session(&session.id).await.unwrap();
}

#[tokio::test]
async fn two_formats_one_fetch() {
    let counts: Counts = [("00", 493_u64), ("11", 507)].into_iter().collect();
    let service =
        Arc::new(InMemoryService::new().with_outcome(ScriptedOutcome::Counts(vec![counts])));
    let backend = backend(&service, 4);

    let mut job = backend.run(bell(), &Overrides::new()).await.unwrap();
    let native = job.result("").await.unwrap().into_native().unwrap();
    let histogram = job.result("cirq").await.unwrap().into_histogram().unwrap();

    assert_eq!(service.calls().list_job_results, 1);
    assert_eq!(job.state(), JobState::Succeeded);

    let bitstrings = native.get_counts(0).unwrap();
    let outcomes = &histogram.histograms[0].outcomes;
    assert_eq!(bitstrings.len(), outcomes.len());
    for (bits, count) in bitstrings.iter() {
        let value = u64::from_str_radix(bits, 2).unwrap();
        assert_eq!(outcomes.get(&value), Some(&count));
    }
}

#[tokio::test]
async fn downloaded_results_decode_like_inline_ones() {
    let service = Arc::new(InMemoryService::new().with_results_by_url(true));
    let backend = backend(&service, 4);

    let mut job = backend
        .run(vec![bell(), bell()], &Overrides::new().shots(100))
        .await
        .unwrap();
    let native = job.result("native").await.unwrap().into_native().unwrap();

    assert_eq!(service.calls().download_result, 1);
    assert_eq!(native.experiments.len(), 2);
    assert_eq!(native.get_counts(1).unwrap().total_shots(), 100);
}

#[tokio::test]
async fn remote_failure_detail_is_surfaced_on_every_call() {
    let service = Arc::new(
        InMemoryService::new()
            .with_pending_polls(1)
            .with_outcome(ScriptedOutcome::Fail("simulation diverged".into())),
    );
    let backend = backend(&service, 4);

    let mut job = backend.run(bell(), &Overrides::new()).await.unwrap();
    for _ in 0..3 {
        let err = job.result("").await.unwrap_err();
        assert!(matches!(err, HalError::JobFailed(_)));
        assert!(err.to_string().contains("simulation diverged"));
    }
    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(service.calls().get_job, 2);
}

#[tokio::test]
async fn unknown_format_makes_no_remote_call() {
    let service = Arc::new(InMemoryService::new());
    let backend = backend(&service, 4);

    let mut job = backend.run(bell(), &Overrides::new()).await.unwrap();
    let before = service.calls();
    let err = job.result("braket").await.unwrap_err();

    assert!(matches!(err, HalError::UnsupportedFormat(_)));
    assert_eq!(service.calls(), before);
}
