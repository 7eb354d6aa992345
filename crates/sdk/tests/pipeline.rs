//! End-to-end capture through the wired facade.

use std::convert::Infallible;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use http::request::Parts;
use http::{Request, Response};
use opsline::config::StoreSettings;
use opsline::context::{isolate, isolate_sync};
use opsline::open_store;
use opsline::prelude::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::{Layer, ServiceExt, service_fn};

fn memory(config: Config) -> Opsline {
    let store = open_store(&StoreSettings::default()).unwrap();
    let opsline = Opsline::new(ConfigHandle::new(config), store);
    opsline.install();
    opsline
}

fn header_tenant(parts: &Parts) -> Result<Option<String>, opsline::config::BoxError> {
    Ok(parts
        .headers
        .get("x-tenant")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned))
}

fn chain(opsline: &Opsline, correlation_id: &str) -> Vec<Event> {
    opsline
        .store()
        .query(
            &EventQuery::new(EventFilter::new().correlation_id(correlation_id))
                .order(Order::Chronological),
        )
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn request_task_and_cache_share_one_correlation() {
    let opsline = memory(Config::default().with_tenant_resolver(header_tenant));

    let bus = Arc::clone(opsline.bus());
    let service = opsline.http_layer().layer(service_fn(move |_: Request<()>| {
        let bus = Arc::clone(&bus);
        async move {
            let mut task =
                TaskEnvelope::new("ReportJob", vec![json!(42)]).with_queue_name("reports");
            let payload = task.around_enqueue(&bus, "inline", |t| serde_json::to_string(t).unwrap());
            Ok::<_, Infallible>(Response::new(payload))
        }
    }));

    let request = Request::builder()
        .header("x-correlation-id", "c1")
        .header("x-tenant", "acme")
        .body(())
        .unwrap();
    let payload = isolate(service.oneshot(request))
        .await
        .unwrap()
        .into_body();

    let task: TaskEnvelope = serde_json::from_str(&payload).unwrap();
    let bus = Arc::clone(opsline.bus());
    let after = isolate(async {
        task.around_perform(&bus, |args| {
            let bus = Arc::clone(&bus);
            async move {
                assert_eq!(args, vec![json!(42)]);
                bus.instrument(
                    CacheSignal::Read {
                        key: "reports/42".into(),
                        hit: Some(false),
                        store: "memory".into(),
                    },
                    || (),
                );
                Ok::<_, std::io::Error>(())
            }
        })
        .await
        .unwrap();
        Context::current()
    })
    .await;
    assert!(after.is_empty());

    let events = chain(&opsline, "c1");
    let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        ["task.enqueue", "task.perform_start", "cache.read", "task.perform"]
    );
    assert!(events.iter().all(|e| e.tenant_id.as_deref() == Some("acme")));
    assert!(
        events
            .iter()
            .all(|e| e.request_id.is_some() && e.request_id == events[0].request_id)
    );

    let perform = &events[3];
    assert_eq!(perform.name, "ReportJob");
    assert_eq!(perform.metadata["exception"], Value::Null);
    assert_eq!(perform.metadata["queue_name"], json!("reports"));
    assert!(perform.duration_ms.is_some());
    assert_eq!(events[0].metadata["adapter"], json!("inline"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_task_reports_error_class_only() {
    #[derive(Debug)]
    struct QuotaExceeded;

    let opsline = memory(Config::default());
    let mut task = TaskEnvelope::new("ExportJob", Vec::new());
    isolate_sync(|| {
        opsline::context::replace(Context::new().with_correlation_id("c2"));
        task.around_enqueue(opsline.bus(), "inline", |_| ());
    });

    let result = isolate(task.around_perform(opsline.bus(), |_| async {
        Err::<(), _>(QuotaExceeded)
    }))
    .await;
    assert!(result.is_err());

    let perform = chain(&opsline, "c2").pop().unwrap();
    assert_eq!(perform.event_type, "task.perform");
    assert_eq!(perform.metadata["exception"], json!("QuotaExceeded"));

    let errors = opsline
        .store()
        .count(
            &EventFilter::new()
                .event_type("task.perform")
                .metadata_flag("exception"),
        )
        .unwrap();
    assert_eq!(errors, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn task_payload_round_trips_every_field() {
    let opsline = memory(Config::default());
    let origin = Context::new()
        .with_correlation_id("c3")
        .with_request_id("r3")
        .with_tenant_id("acme")
        .with_actor_id("user-7");

    let payload = origin.clone().scope_sync(|| {
        let mut task = TaskEnvelope::new("SyncJob", vec![json!({"full": true})]);
        task.around_enqueue(opsline.bus(), "inline", |_| ());
        serde_json::to_vec(&task).unwrap()
    });

    let task: TaskEnvelope = serde_json::from_slice(&payload).unwrap();
    let seen = tokio::spawn(async move {
        let bus = Instrumentation::new();
        task.around_perform(&bus, |_| async { Ok::<_, Infallible>(Context::current()) })
            .await
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(seen, origin);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_frames_do_not_mix() {
    let opsline = memory(Config::default());

    let handles = ["alpha", "beta"].map(|tenant| {
        let recorder = opsline.recorder().clone();
        tokio::spawn(Context::new().with_tenant_id(tenant).scope(async move {
            for i in 0..100 {
                recorder.record("cache.read", &format!("{tenant}/{i}"), None, Metadata::new());
                tokio::task::yield_now().await;
            }
            opsline::context::correlation_id()
        }))
    });

    let mut correlations = Vec::new();
    for (tenant, handle) in ["alpha", "beta"].into_iter().zip(handles) {
        let correlation_id = handle.await.unwrap().unwrap();
        let events = opsline
            .store()
            .query(&EventQuery::new(EventFilter::new().tenant_id(tenant)).limit(1000))
            .unwrap();
        assert_eq!(events.len(), 100);
        assert!(events.iter().all(|e| e.name.starts_with(tenant)));
        assert!(
            events
                .iter()
                .all(|e| e.correlation_id.as_deref() == Some(correlation_id.as_str()))
        );
        correlations.push(correlation_id);
    }
    assert_ne!(correlations[0], correlations[1]);
}

#[rstest]
#[case(1.0, 1000, 1000)]
#[case(0.0, 0, 0)]
#[case(0.5, 400, 600)]
fn sampling_rate_is_honored(#[case] rate: f64, #[case] low: u64, #[case] high: u64) {
    let opsline = memory(Config {
        sample_rate: rate,
        ..Config::default()
    });
    isolate_sync(|| {
        for _ in 0..1000 {
            opsline
                .recorder()
                .record("cache.read", "k", None, Metadata::new());
        }
    });
    let stored = opsline.store().count(&EventFilter::new()).unwrap();
    assert!((low..=high).contains(&stored), "{stored} outside {low}..={high}");
}

#[test]
fn signals_raised_while_recording_are_dropped() {
    let slot: Arc<OnceLock<Arc<Instrumentation>>> = Arc::default();
    let inner = Arc::clone(&slot);
    let opsline = memory(Config::default().with_redactor(move |metadata| {
        if let Some(bus) = inner.get() {
            bus.emit(
                &Signal::from(CacheSignal::Delete {
                    key: "audit".into(),
                    store: "memory".into(),
                }),
                None,
            );
        }
        Ok(metadata)
    }));
    assert!(slot.set(Arc::clone(opsline.bus())).is_ok());

    isolate_sync(|| {
        opsline.bus().emit(
            &Signal::from(CacheSignal::Write {
                key: "users/1".into(),
                store: "memory".into(),
                value_bytes: Some(12),
            }),
            None,
        );
    });

    let events = opsline.store().query(&EventQuery::default()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "cache.write");
}

#[test]
fn metadata_is_redacted_then_truncated() {
    let opsline = memory(
        Config {
            max_payload_bytes: 64,
            ..Config::default()
        }
        .with_redactor(|mut metadata| {
            metadata.remove("password");
            Ok(metadata)
        }),
    );

    let small = json!({"user": "ada", "password": "hunter2"});
    let large = json!({"password": "hunter2", "blob": "x".repeat(100)});
    let (small_id, large_id) = isolate_sync(|| {
        let recorder = opsline.recorder();
        (
            recorder.record_serialized("cache.write", "small", None, &small),
            recorder.record_serialized("cache.write", "large", None, &large),
        )
    });

    let small = opsline.store().fetch(small_id.unwrap()).unwrap();
    assert_eq!(Value::Object(small.metadata), json!({"user": "ada"}));

    let redacted_len = serde_json::to_string(&json!({"blob": "x".repeat(100)}))
        .unwrap()
        .len();
    let large = opsline.store().fetch(large_id.unwrap()).unwrap();
    assert_eq!(
        Value::Object(large.metadata),
        json!({"truncated": true, "max_bytes": 64, "bytes": redacted_len})
    );
}

#[test]
fn sqlite_settings_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        store: StoreSettings {
            backend: opsline::config::StoreBackend::Sqlite,
            path: Some(dir.path().join("opsline.db")),
        },
        ..Settings::default()
    };

    let opsline = Opsline::from_settings(&settings).unwrap();
    let id = isolate_sync(|| {
        opsline::context::replace(Context::new().with_correlation_id("c4"));
        opsline
            .recorder()
            .record("cable.broadcast", "chat_1", Some(1.5), Metadata::new())
    })
    .unwrap();
    drop(opsline);

    let reopened = open_store(&settings.store).unwrap();
    let event = reopened.fetch(id).unwrap();
    assert_eq!(event.correlation_id.as_deref(), Some("c4"));
    assert_eq!(event.duration_ms, Some(1.5));
}

#[tokio::test(flavor = "multi_thread")]
async fn retention_runs_in_the_background() {
    let opsline = Opsline::from_settings(&Settings::default())
        .unwrap()
        .with_purge_interval(Duration::from_millis(10));
    opsline
        .store()
        .insert(NewEvent::new("cache.read", "old").with_occurred_at(Utc::now() - TimeDelta::days(8)))
        .unwrap();
    opsline
        .store()
        .insert(NewEvent::new("cache.read", "fresh"))
        .unwrap();

    let cancel = CancellationToken::new();
    let handle = opsline.spawn_retention(cancel.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    handle.await.unwrap();

    let left = opsline.store().query(&EventQuery::default()).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].name, "fresh");
}
