use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use scan_console_rs::api::{HttpBackend, ScanBackend, CSRF_HEADER};
use scan_console_rs::config::{ClientConfig, PollPolicy};
use scan_console_rs::controller::Controller;
use scan_console_rs::error::{PollError, StopError, SubmitError};
use scan_console_rs::machine::Phase;
use scan_console_rs::request::{build_advanced_request, build_quick_request, AdvancedForm, PortOption};
use scan_console_rs::types::{JobId, JobStatus};
use scan_console_rs::view::PanelState;

const TOKEN: &str = "test-token";

#[derive(Clone, Default)]
struct Fake {
    base: Arc<Mutex<String>>,
    bodies: Arc<Mutex<Vec<Value>>>,
    progress_calls: Arc<AtomicUsize>,
}

async fn create_scan(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) != Some(TOKEN) {
        return (StatusCode::FORBIDDEN, Json(json!({"detail": "CSRF token missing"})));
    }
    fake.bodies.lock().unwrap().push(body.clone());
    match body["target"].as_str() {
        Some("down") => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to start scan"})),
        ),
        Some("slow") => (
            StatusCode::BAD_REQUEST,
            Json(json!({"timeout": ["Timeout must be between 1 and 60 seconds"]})),
        ),
        _ => (
            StatusCode::CREATED,
            Json(json!({"job_id": "abc123", "message": "Scan started"})),
        ),
    }
}

async fn list_scans(Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    let limit: usize = q.get("limit").and_then(|l| l.parse().ok()).unwrap_or(50);
    let jobs = vec![
        json!({"id": "abc123", "target": "192.168.1.1", "ports": "common",
               "protocols": ["tcp"], "status": "completed",
               "created_at": "2024-05-10T15:20:00Z"}),
        json!({"id": "def456", "target": "10.0.0.0/24", "ports": "80,443",
               "protocols": "TCP,UDP", "status": "running",
               "created_at": "2024-05-10T15:25:00Z"}),
    ];
    Json(json!({"results": jobs.into_iter().take(limit).collect::<Vec<_>>()}))
}

async fn progress(State(fake): State<Fake>, Path(id): Path<String>) -> impl IntoResponse {
    match id.as_str() {
        "abc123" => {
            let n = fake.progress_calls.fetch_add(1, Ordering::SeqCst);
            let body = if n == 0 {
                json!({"scanned": 10, "total": 100, "open": 2, "percentage": 10, "status": "running"})
            } else {
                json!({"scanned": 100, "total": 100, "open": 3, "percentage": 100, "status": "completed"})
            };
            (StatusCode::OK, body.to_string())
        }
        "garbled" => (StatusCode::OK, "<html>oops</html>".to_string()),
        _ => (StatusCode::NOT_FOUND, json!({"detail": "Not found."}).to_string()),
    }
}

async fn stop(headers: HeaderMap, Path(id): Path<String>) -> impl IntoResponse {
    if headers.get(CSRF_HEADER).is_none() {
        return (StatusCode::FORBIDDEN, Json(json!({"detail": "CSRF token missing"})));
    }
    if id == "abc123" {
        (StatusCode::OK, Json(json!({"message": "Scan stopped"})))
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({"error": "Scan is not running"})))
    }
}

async fn stats() -> impl IntoResponse {
    Json(json!({"total_scans": 7, "active_scans": 1, "hosts_found": 12, "open_ports": 40}))
}

async fn results(
    State(fake): State<Fake>,
    Path(id): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let base = fake.base.lock().unwrap().clone();
    let row = |host: &str, port: u16, status: &str| {
        json!({"id": port, "host": host, "port": port, "protocol": "TCP",
               "status": status, "response_time": 1.5, "created_at": "2024-05-10T15:21:00Z"})
    };
    let body = if id == "looping" {
        json!({"count": 1, "next": format!("{base}/api/scans/{id}/results/"), "previous": null,
               "results": [row("192.168.1.9", 80, "open")]})
    } else if q.get("page").map(String::as_str) == Some("2") {
        json!({"count": 3, "next": null, "previous": null,
               "results": [row("192.168.1.1", 443, "open")]})
    } else {
        json!({"count": 3, "next": format!("{base}/api/scans/{id}/results/?page=2"), "previous": null,
               "results": [row("192.168.1.1", 22, "open"), row("192.168.1.1", 23, "closed")]})
    };
    Json(body)
}

async fn spawn_fake() -> (Fake, String) {
    let fake = Fake::default();
    let app = Router::new()
        .route("/api/scans/", get(list_scans).post(create_scan))
        .route("/api/scans/{id}/progress/", get(progress))
        .route("/api/scans/{id}/stop/", post(stop))
        .route("/api/scans/{id}/results/", get(results))
        .route("/api/dashboard/stats/", get(stats))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    *fake.base.lock().unwrap() = base.clone();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (fake, base)
}

fn backend(base: &str, token: Option<&str>) -> HttpBackend {
    let config = ClientConfig {
        base_url: format!("{base}/"),
        csrf_token: token.map(str::to_string),
        request_timeout: Duration::from_secs(5),
        poll: PollPolicy {
            interval: Duration::from_millis(20),
            max_retries: 0,
        },
    };
    HttpBackend::new(&config).unwrap()
}

#[tokio::test]
async fn submit_posts_canonical_body_with_token() {
    let (fake, base) = spawn_fake().await;
    let api = backend(&base, Some(TOKEN));

    let mut form = AdvancedForm {
        target: "10.0.0.0/24".into(),
        udp: true,
        timeout: "5".into(),
        threads: "100".into(),
        ..AdvancedForm::default()
    };
    form.select_port_option(PortOption::Custom);
    form.ports.set_custom("80,90-95,443");
    let request = build_advanced_request(&form).unwrap();

    let job = api.submit(&request).await.unwrap();
    assert_eq!(job, JobId::new("abc123"));
    assert_eq!(
        fake.bodies.lock().unwrap()[0],
        json!({
            "target": "10.0.0.0/24",
            "ports": "80,90-95,443",
            "protocols": ["tcp", "udp"],
            "timeout": 5,
            "threads": 100
        })
    );
}

#[tokio::test]
async fn submit_errors_carry_server_message() {
    let (_fake, base) = spawn_fake().await;
    let api = backend(&base, Some(TOKEN));

    let err = api.submit(&build_quick_request("down").unwrap()).await.unwrap_err();
    assert_eq!(
        err,
        SubmitError::Rejected {
            status: 500,
            message: "Failed to start scan".into()
        }
    );

    let err = api.submit(&build_quick_request("slow").unwrap()).await.unwrap_err();
    assert_eq!(
        err,
        SubmitError::Rejected {
            status: 400,
            message: "timeout: Timeout must be between 1 and 60 seconds".into()
        }
    );

    let no_token = backend(&base, None);
    let err = no_token.submit(&build_quick_request("host").unwrap()).await.unwrap_err();
    assert!(matches!(err, SubmitError::Rejected { status: 403, .. }));
}

#[tokio::test]
async fn progress_and_errors() {
    let (_fake, base) = spawn_fake().await;
    let api = backend(&base, Some(TOKEN));

    let p = api.progress(&JobId::new("abc123")).await.unwrap();
    assert_eq!((p.scanned, p.total, p.open_count), (10, 100, 2));
    assert_eq!(p.status, JobStatus::Running);

    assert_eq!(
        api.progress(&JobId::new("missing")).await.unwrap_err(),
        PollError::Status(404)
    );
    assert!(matches!(
        api.progress(&JobId::new("garbled")).await.unwrap_err(),
        PollError::Decode(_)
    ));
}

#[tokio::test]
async fn stop_acknowledged_or_rejected() {
    let (_fake, base) = spawn_fake().await;
    let api = backend(&base, Some(TOKEN));

    api.stop(&JobId::new("abc123")).await.unwrap();
    assert_eq!(
        api.stop(&JobId::new("done")).await.unwrap_err(),
        StopError::Rejected {
            status: 400,
            message: "Scan is not running".into()
        }
    );
}

#[tokio::test]
async fn transport_failure_is_reported() {
    // nothing listens on this port once the listener is dropped
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let api = backend(&base, Some(TOKEN));

    assert!(matches!(
        api.submit(&build_quick_request("host").unwrap()).await,
        Err(SubmitError::Transport(_))
    ));
    assert!(matches!(
        api.stop(&JobId::new("abc123")).await,
        Err(StopError::Transport(_))
    ));
}

#[tokio::test]
async fn peripheral_endpoints() {
    let (_fake, base) = spawn_fake().await;
    let api = backend(&base, None);

    let stats = api.dashboard_stats().await.unwrap();
    assert_eq!((stats.total_scans, stats.open_ports), (7, 40));

    let jobs = api.recent_jobs(1).await.unwrap();
    assert_eq!(jobs.results.len(), 1);
    assert_eq!(jobs.results[0].status, JobStatus::Completed);
    let jobs = api.recent_jobs(5).await.unwrap();
    assert_eq!(jobs.results[1].protocols, vec!["tcp", "udp"]);

    let page = api.results(&JobId::new("abc123")).await.unwrap();
    assert_eq!(page.count, 3);
    let ports: Vec<u16> = page.results.iter().map(|r| r.port).collect();
    assert_eq!(ports, vec![22, 23, 443]);
}

#[tokio::test]
async fn results_stop_when_next_links_back() {
    let (_fake, base) = spawn_fake().await;
    let api = backend(&base, None);

    let page = tokio::time::timeout(Duration::from_secs(5), api.results(&JobId::new("looping")))
        .await
        .expect("pagination terminates")
        .unwrap();
    let ports: Vec<u16> = page.results.iter().map(|r| r.port).collect();
    assert_eq!(ports, vec![80]);
}

#[tokio::test]
async fn controller_over_http_reaches_completion() {
    let (fake, base) = spawn_fake().await;
    let policy = PollPolicy {
        interval: Duration::from_millis(20),
        max_retries: 0,
    };
    let mut c = Controller::new(backend(&base, Some(TOKEN)), PanelState::default(), policy);

    let job = c.submit(build_quick_request("192.168.1.1").unwrap()).await.unwrap();
    assert_eq!(job, JobId::new("abc123"));

    let phase = tokio::time::timeout(Duration::from_secs(5), c.run_until_settled())
        .await
        .expect("scan settles");
    assert_eq!(phase, Phase::Completed);
    assert_eq!(fake.progress_calls.load(Ordering::SeqCst), 2);
    assert_eq!(c.view().progress.open_count, 3);
    assert!(c.view().view_results_visible);
}
