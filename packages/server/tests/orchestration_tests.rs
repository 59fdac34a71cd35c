//! End-to-end orchestration scenarios against the kernel and the router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use server_core::config::Config;
use server_core::kernel::deps::ServerDeps;
use server_core::kernel::jobs::events::JobEvent;
use server_core::kernel::jobs::job::JobRequest;
use server_core::kernel::jobs::manager::DisconnectPolicy;
use server_core::kernel::stream_hub::subscriber_stream;
use server_core::kernel::testing::MockGenerator;
use server_core::kernel::traits::ProviderKind;
use server_core::server::build_app;

fn test_config(rate_limit: u32, period: Duration) -> Config {
    Config {
        port: 0,
        openai_api_key: None,
        openai_model: "gpt-4o".to_string(),
        rate_limit,
        rate_limit_period: period,
        idempotency_header: "idempotency-key".to_string(),
        idempotency_ttl_hours: 24,
        heartbeat_interval: Duration::from_secs(30),
        provider_timeout: Duration::from_secs(5),
        provider_max_attempts: 3,
        provider_backoff: Duration::from_millis(1),
        disconnect_policy: DisconnectPolicy::Ignore,
        retention_hours: 24,
    }
}

async fn deps_with(generator: MockGenerator, config: Config) -> ServerDeps {
    let deps = ServerDeps::from_config(config);
    deps.providers
        .install(ProviderKind::Echo, Arc::new(generator))
        .await;
    deps
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, value)
}

async fn wait_for_status(app: &Router, job_id: &str, wanted: &str) -> Value {
    for _ in 0..200 {
        let (status, _, body) = send(app, "GET", &format!("/api/jobs/{job_id}"), None, &[]).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == wanted {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} never reached {wanted}");
}

#[tokio::test]
async fn four_step_job_streams_quarter_progress_then_completes() {
    let deps = deps_with(
        MockGenerator::with_fragments(vec!["a ", "b ", "c ", "d"]),
        test_config(100, Duration::from_secs(60)),
    )
    .await;

    let request = JobRequest::builder()
        .project_id(Uuid::new_v4())
        .title("t")
        .steps(4)
        .build();
    let job = deps.manager.submit(request).unwrap();

    // Subscribe before yielding so the drive task cannot outrun us
    let rx = deps.hub.subscribe(job.id);
    let snapshot = deps.store.get(job.id).unwrap();
    let mut stream = Box::pin(subscriber_stream(rx, snapshot, Duration::from_secs(30)));

    let mut progress = Vec::new();
    let mut previews = 0;
    let mut completed = None;
    while let Some(event) = stream.next().await {
        match event {
            JobEvent::Progress(p) => progress.push(p.value),
            JobEvent::Preview(p) => {
                assert!(p.is_partial);
                previews += 1;
            }
            JobEvent::Completed(c) => {
                completed = Some(c);
                break;
            }
            JobEvent::Failed(f) => panic!("unexpected failure: {:?}", f.error),
            JobEvent::Heartbeat(_) => {}
        }
    }

    progress.dedup();
    assert_eq!(progress, vec![0, 25, 50, 75]);
    assert_eq!(previews, 4);
    let result = completed.unwrap().result;
    assert_eq!(result.content, "a b c d");
    assert_eq!(result.word_count, 4);

    // Stream is closed after the terminal event
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn stream_route_delivers_terminal_for_already_settled_job() {
    let deps = deps_with(
        MockGenerator::with_fragments(vec!["x"]),
        test_config(100, Duration::from_secs(60)),
    )
    .await;
    let app = build_app(deps);

    let body = json!({ "projectId": Uuid::new_v4(), "title": "late viewer" });
    let (_, _, accepted) = send(&app, "POST", "/api/jobs", Some(body), &[]).await;
    let job_id = accepted["id"].as_str().unwrap().to_string();
    wait_for_status(&app, &job_id, "COMPLETED").await;

    // Connecting after completion must still yield the terminal event and
    // close; collecting the whole body only returns if the stream ends.
    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/jobs/{job_id}/stream"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let wire = String::from_utf8(
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec(),
    )
    .unwrap();
    assert!(wire.contains("event: progress"));
    assert!(wire.contains("event: completed"));
}

#[tokio::test]
async fn idempotent_resubmission_replays_without_a_second_job() {
    let deps = deps_with(
        MockGenerator::with_fragments(vec!["x"]),
        test_config(100, Duration::from_secs(60)),
    )
    .await;
    let app = build_app(deps.clone());

    let body = json!({ "projectId": Uuid::new_v4(), "title": "intro" });
    let headers = [("idempotency-key", "key-1")];

    let (status, _, first) = send(&app, "POST", "/api/jobs", Some(body.clone()), &headers).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = first["id"].as_str().unwrap().to_string();

    let (status, reply_headers, second) =
        send(&app, "POST", "/api/jobs", Some(body.clone()), &headers).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(reply_headers.get("idempotent-replay").unwrap(), "true");
    assert_eq!(second["id"].as_str().unwrap(), job_id);

    // Exactly one job exists
    let (_, _, listing) = send(&app, "GET", "/api/jobs", None, &[]).await;
    assert_eq!(listing["jobs"].as_array().unwrap().len(), 1);

    // Same key with a different body is a conflict
    let other = json!({ "projectId": Uuid::new_v4(), "title": "different" });
    let (status, _, conflict) = send(&app, "POST", "/api/jobs", Some(other), &headers).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn malformed_idempotency_key_is_rejected() {
    let deps = deps_with(
        MockGenerator::with_fragments(vec!["x"]),
        test_config(100, Duration::from_secs(60)),
    )
    .await;
    let app = build_app(deps);

    let body = json!({ "projectId": Uuid::new_v4(), "title": "t" });
    let (status, _, error) = send(
        &app,
        "POST",
        "/api/jobs",
        Some(body),
        &[("idempotency-key", "not valid!")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn provider_failures_retry_then_complete_with_count() {
    let deps = deps_with(
        MockGenerator::with_fragments(vec!["done"]).failing_times(2),
        test_config(100, Duration::from_secs(60)),
    )
    .await;
    let app = build_app(deps);

    let body = json!({ "projectId": Uuid::new_v4(), "title": "flaky" });
    let (status, _, accepted) = send(&app, "POST", "/api/jobs", Some(body), &[]).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let job_id = accepted["id"].as_str().unwrap().to_string();
    let settled = wait_for_status(&app, &job_id, "COMPLETED").await;
    assert_eq!(settled["retryCount"], 2);
    assert_eq!(settled["progressPct"], 100);
    assert_eq!(settled["result"]["content"], "done");
}

#[tokio::test]
async fn exhausted_attempts_fail_with_provider_error() {
    let deps = deps_with(
        MockGenerator::with_fragments(vec!["never"]).failing_times(10),
        test_config(100, Duration::from_secs(60)),
    )
    .await;
    let app = build_app(deps);

    let body = json!({ "projectId": Uuid::new_v4(), "title": "doomed" });
    let (_, _, accepted) = send(&app, "POST", "/api/jobs", Some(body), &[]).await;
    let job_id = accepted["id"].as_str().unwrap().to_string();

    let settled = wait_for_status(&app, &job_id, "FAILED").await;
    assert_eq!(settled["error"]["code"], "PROVIDER_ERROR");
}

#[tokio::test]
async fn cancel_twice_is_idempotent_and_settles_canceled() {
    let deps = deps_with(
        MockGenerator::stalled(),
        test_config(100, Duration::from_secs(60)),
    )
    .await;
    let app = build_app(deps);

    let body = json!({ "projectId": Uuid::new_v4(), "title": "stuck" });
    let (_, _, accepted) = send(&app, "POST", "/api/jobs", Some(body), &[]).await;
    let job_id = accepted["id"].as_str().unwrap().to_string();

    // Let the drive task start streaming
    tokio::time::sleep(Duration::from_millis(10)).await;

    let cancel_uri = format!("/api/jobs/{job_id}/cancel");
    let (first, _, _) = send(&app, "POST", &cancel_uri, None, &[]).await;
    let (second, _, _) = send(&app, "POST", &cancel_uri, None, &[]).await;
    assert_eq!(first, StatusCode::NO_CONTENT);
    assert_eq!(second, StatusCode::NO_CONTENT);

    wait_for_status(&app, &job_id, "CANCELED").await;

    // Unknown job: cancellation is already satisfied
    let (status, _, _) = send(
        &app,
        "POST",
        &format!("/api/jobs/{}/cancel", Uuid::new_v4()),
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn rate_limiter_denies_over_limit_with_retry_after() {
    let deps = deps_with(
        MockGenerator::with_fragments(vec!["x"]),
        test_config(3, Duration::from_secs(2)),
    )
    .await;
    let app = build_app(deps);

    let project = Uuid::new_v4();
    let body = json!({ "projectId": project, "title": "burst" });
    for _ in 0..3 {
        let (status, _, _) = send(&app, "POST", "/api/jobs", Some(body.clone()), &[]).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let (status, headers, error) = send(&app, "POST", "/api/jobs", Some(body), &[]).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error["error"]["code"], "RATE_LIMITED");
    let retry_after: u64 = headers
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 2);

    // A different project is not affected
    let other = json!({ "projectId": Uuid::new_v4(), "title": "fine" });
    let (status, _, _) = send(&app, "POST", "/api/jobs", Some(other), &[]).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn unknown_job_routes_return_not_found() {
    let deps = deps_with(
        MockGenerator::with_fragments(vec!["x"]),
        test_config(100, Duration::from_secs(60)),
    )
    .await;
    let app = build_app(deps);

    let id = Uuid::new_v4();
    let (status, _, error) = send(&app, "GET", &format!("/api/jobs/{id}"), None, &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"]["code"], "NOT_FOUND");

    let (status, _, _) = send(&app, "GET", &format!("/api/jobs/{id}/stream"), None, &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn document_ingestion_runs_to_indexed_and_dedups() {
    let deps = deps_with(
        MockGenerator::with_fragments(vec!["x"]),
        test_config(100, Duration::from_secs(60)),
    )
    .await;
    let app = build_app(deps);

    let project = Uuid::new_v4();
    let upload = json!({
        "projectId": project,
        "fileName": "notes.txt",
        "content": "some meaningful document text to index",
    });

    let (status, _, accepted) = send(&app, "POST", "/api/documents", Some(upload.clone()), &[]).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = accepted["jobId"].as_str().unwrap().to_string();
    assert_eq!(accepted["status"]["status"], "QUEUED");

    let status_uri = format!("/api/documents/jobs/{job_id}");
    let mut indexed = None;
    for _ in 0..200 {
        let (status, _, body) = send(&app, "GET", &status_uri, None, &[]).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "INDEXED" {
            indexed = Some(body);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let indexed = indexed.expect("ingestion never reached INDEXED");
    assert_eq!(indexed["progressPct"], 100);

    // Same bytes again: content-addressed dedup, no new job
    let (status, _, duplicate) = send(&app, "POST", "/api/documents", Some(upload), &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(duplicate["duplicate"], true);
}

#[tokio::test]
async fn provider_diagnostics_report_availability() {
    let deps = deps_with(
        MockGenerator::with_fragments(vec!["x"]),
        test_config(100, Duration::from_secs(60)),
    )
    .await;
    let app = build_app(deps);

    let (status, _, body) = send(&app, "GET", "/api/providers", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    let providers = body["providers"].as_array().unwrap();
    let openai = providers
        .iter()
        .find(|p| p["provider"] == "open_ai")
        .unwrap();
    assert_eq!(openai["available"], false);
    assert!(openai["detail"].as_str().unwrap().contains("OPENAI_API_KEY"));
}

#[tokio::test]
async fn metrics_expose_job_counters() {
    let deps = deps_with(
        MockGenerator::with_fragments(vec!["x"]),
        test_config(100, Duration::from_secs(60)),
    )
    .await;
    let app = build_app(deps);

    let body = json!({ "projectId": Uuid::new_v4(), "title": "count me" });
    let (_, _, accepted) = send(&app, "POST", "/api/jobs", Some(body), &[]).await;
    let job_id = accepted["id"].as_str().unwrap().to_string();
    wait_for_status(&app, &job_id, "COMPLETED").await;

    let request = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec(),
    )
    .unwrap();
    assert!(text.contains("jobs_submitted_total 1"));
    assert!(text.contains("jobs_completed_total 1"));
}
