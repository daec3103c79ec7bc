//! Request interceptor against a live axum server

use crate::common::{test_config, MockTransport};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use insight_relay::cli::demo_router;
use insight_relay::interceptor::HandlerError;
use insight_relay::record::{
    DependencyRecord, ExceptionRecord, RecordBody, RequestRecord, Severity, TelemetryRecord,
};
use insight_relay::{PipelineBuilder, PipelineHandle, TelemetryClient, TelemetryRouterExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn ok(State(client): State<TelemetryClient>) -> &'static str {
    client.track_event(insight_relay::record::EventRecord::new("okVisited"));
    "ok"
}

async fn missing() -> Result<&'static str, HandlerError> {
    Err(HandlerError::NotFound("widget 7".to_string()))
}

async fn failing() -> Result<&'static str, HandlerError> {
    Err(HandlerError::Internal(anyhow::anyhow!("database unreachable")))
}

async fn panics() -> &'static str {
    panic!("handler exploded")
}

fn test_router(client: TelemetryClient) -> Router {
    let routes = Router::new()
        .route("/ok", get(ok))
        .route("/missing", get(missing))
        .route("/fail", get(failing))
        .route("/panic", get(panics))
        .with_state::<()>(client.clone());
    routes.with_telemetry(client)
}

async fn start(
    router: impl FnOnce(TelemetryClient) -> Router,
) -> (String, Arc<MockTransport>, PipelineHandle) {
    let (base, _client, transport, handle) = start_with_client(router).await;
    (base, transport, handle)
}

async fn start_with_client(
    router: impl FnOnce(TelemetryClient) -> Router,
) -> (String, TelemetryClient, Arc<MockTransport>, PipelineHandle) {
    let transport = Arc::new(MockTransport::healthy());
    let (client, handle) = PipelineBuilder::new(test_config(None))
        .transport(transport.clone())
        .try_start()
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(client.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), client, transport, handle)
}

async fn finish(transport: &MockTransport, handle: PipelineHandle) -> Vec<TelemetryRecord> {
    handle.shutdown_with_timeout(Duration::from_secs(5)).await;
    transport.delivered_records()
}

fn requests(records: &[TelemetryRecord]) -> Vec<RequestRecord> {
    records
        .iter()
        .filter_map(|r| match &r.body {
            RecordBody::Request(req) => Some(req.clone()),
            _ => None,
        })
        .collect()
}

fn exceptions(records: &[TelemetryRecord]) -> Vec<ExceptionRecord> {
    records
        .iter()
        .filter_map(|r| match &r.body {
            RecordBody::Exception(e) => Some(e.clone()),
            _ => None,
        })
        .collect()
}

fn dependencies(records: &[TelemetryRecord]) -> Vec<DependencyRecord> {
    records
        .iter()
        .filter_map(|r| match &r.body {
            RecordBody::Dependency(d) => Some(d.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_one_request_record_per_request() {
    let (base, transport, handle) = start(test_router).await;
    let http = reqwest::Client::new();

    let mut expected = Vec::new();
    for (path, status) in [("/ok", 200), ("/missing", 404), ("/ok", 200), ("/fail", 500)] {
        let response = http.get(format!("{base}{path}")).send().await.unwrap();
        assert_eq!(response.status().as_u16(), status);
        expected.push((path.to_string(), status));
    }

    let records = finish(&transport, handle).await;
    let mut seen: Vec<(String, u16)> = requests(&records)
        .into_iter()
        .map(|r| {
            assert_eq!(r.method, "GET");
            (r.path, r.status_code)
        })
        .collect();
    seen.sort();
    expected.sort();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_handler_error_reports_exception_and_request() {
    let (base, transport, handle) = start(test_router).await;

    let response = reqwest::get(format!("{base}/fail")).await.unwrap();
    assert_eq!(response.status().as_u16(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "An error occurred");

    let records = finish(&transport, handle).await;
    let requests = requests(&records);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/fail");
    assert_eq!(requests[0].status_code, 500);

    let exceptions = exceptions(&records);
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].message, "database unreachable");
    assert_eq!(exceptions[0].severity, Severity::High);
}

#[tokio::test]
async fn test_client_error_keeps_message() {
    let (base, transport, handle) = start(test_router).await;

    let response = reqwest::get(format!("{base}/missing")).await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "not found: widget 7");

    let records = finish(&transport, handle).await;
    let exceptions = exceptions(&records);
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].severity, Severity::Low);
}

#[tokio::test]
async fn test_panic_becomes_500_with_exception() {
    let (base, transport, handle) = start(test_router).await;

    let response = reqwest::get(format!("{base}/panic")).await.unwrap();
    assert_eq!(response.status().as_u16(), 500);

    // Server keeps serving after a panic
    let response = reqwest::get(format!("{base}/ok")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let records = finish(&transport, handle).await;
    let requests = requests(&records);
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .any(|r| r.path == "/panic" && r.status_code == 500));

    let exceptions = exceptions(&records);
    assert_eq!(exceptions.len(), 1);
    assert!(exceptions[0].message.contains("handler exploded"));
    assert_eq!(exceptions[0].severity, Severity::High);
}

#[tokio::test]
async fn test_demo_routes() {
    let (base, transport, handle) = start(demo_router).await;

    let response = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = reqwest::get(format!("{base}/api/data")).await.unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Data processed successfully");

    let response = reqwest::get(format!("{base}/api/error")).await.unwrap();
    assert_eq!(response.status().as_u16(), 500);

    let records = finish(&transport, handle).await;
    assert_eq!(requests(&records).len(), 3);
    assert_eq!(exceptions(&records).len(), 1);

    let events: Vec<_> = records
        .iter()
        .filter_map(|r| match &r.body {
            RecordBody::Event(e) => Some(e.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "homePageVisited");
    assert_eq!(events[0].properties["customProperty"], "customValue");

    let metric = records
        .iter()
        .find_map(|r| match &r.body {
            RecordBody::Metric(m) => Some(m.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(metric.name, "ProcessingTime");
    assert!(metric.value >= 100.0);
}

#[tokio::test]
async fn test_outbound_http_calls_recorded_as_dependencies() {
    let (base, client, transport, handle) = start_with_client(test_router).await;
    let http = reqwest::Client::new();

    let response = client
        .track_http(http.get(format!("{base}/ok?verbose=1")))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let response = client.track_http(http.get(format!("{base}/fail"))).await.unwrap();
    assert_eq!(response.status().as_u16(), 500);

    let records = finish(&transport, handle).await;
    let mut deps = dependencies(&records);
    deps.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(deps.len(), 2);

    let host = base.trim_start_matches("http://");
    assert_eq!(deps[0].name, "GET /fail");
    assert_eq!(deps[0].result_code, 500);
    assert!(!deps[0].success);
    assert_eq!(deps[1].name, "GET /ok");
    assert_eq!(deps[1].target, host);
    assert_eq!(deps[1].data, format!("{base}/ok"));
    assert_eq!(deps[1].result_code, 200);
    assert!(deps[1].success);
    assert!(deps.iter().all(|d| d.type_name == "HTTP"));

    // The server side still reports its own request records
    assert_eq!(requests(&records).len(), 2);
}
