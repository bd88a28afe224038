mod common;

use common::*;
use record_rag::config::Config;
use record_rag::instance::{Instance, LogInstance, TripInstance};
use record_rag::server::{router, AppState};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

async fn spawn_server(dir: &Path, generator: Arc<CountingGenerator>) -> String {
    let mut config = Config::default();
    config.logs = Some(source_config(dir));
    config.evaluation.report_path = dir.join("eval_results.csv");
    let logs: LogInstance = Instance::open("logs", &source_config(dir), &[], hashed_embedder())
        .await
        .unwrap();

    let state = AppState::new(Arc::new(config), generator).with_logs(Arc::new(logs), None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_search_with_summary() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs());
    let generator = Arc::new(CountingGenerator::new());
    let base = spawn_server(tmp.path(), generator.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/search"))
        .json(&json!({ "query": "packet loss on node_1", "k": 2, "summarize": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert_eq!(body["results"][0]["record"]["node_id"], "node_1");
    assert_eq!(body["answer"]["kind"], "summary");
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_search_filters_by_severity() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs());
    let base = spawn_server(tmp.path(), Arc::new(CountingGenerator::new())).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{base}/search"))
        .json(&json!({ "query": "node failure", "k": 10, "severity": "WARNING" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["record"]["alarm_code"], "CPU_HIGH");
    assert!(body.get("answer").is_none());
}

#[tokio::test]
async fn test_error_contract() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &[]);
    let base = spawn_server(tmp.path(), Arc::new(CountingGenerator::new())).await;
    let client = reqwest::Client::new();

    let blank = client
        .post(format!("{base}/search"))
        .json(&json!({ "query": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(blank.status(), 400);
    let body: Value = blank.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let empty = client
        .post(format!("{base}/search"))
        .json(&json!({ "query": "cpu" }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 404);
    let body: Value = empty.json().await.unwrap();
    assert_eq!(body["error"]["code"], "no_data");

    let ask = client
        .post(format!("{base}/ask"))
        .json(&json!({ "query": "cheapest trip to Ankara" }))
        .send()
        .await
        .unwrap();
    assert_eq!(ask.status(), 404);
    let body: Value = ask.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_configured");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs());
    let base = spawn_server(tmp.path(), Arc::new(CountingGenerator::new())).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["instances"][0]["name"], "logs");
    assert_eq!(health["instances"][0]["rows"], 4);
    assert_eq!(health["instances"][0]["dimension"], 64);

    let metrics: Value = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["available"], false);
    assert!(metrics["records"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ask_answers_from_trip_corpus() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("trips.csv"),
        format!(
            "{TRIP_HEADER}\
             Istanbul,Ankara,6.0,550,Metro,12\n\
             Ankara,Antalya,7.0,600,Metro,10\n\
             Istanbul,Antalya,10.0,850,Ulusoy,6\n"
        ),
    )
    .unwrap();
    let mut config = Config::default();
    config.trips = Some(source_config(tmp.path()));
    let trips: TripInstance = Instance::open("trips", &source_config(tmp.path()), &[], hashed_embedder())
        .await
        .unwrap();
    let state = AppState::new(Arc::new(config), Arc::new(CountingGenerator::new()))
        .with_trips(Arc::new(trips), None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let body: Value = reqwest::Client::new()
        .post(format!("http://{addr}/ask"))
        .json(&json!({ "query": "cheapest trip to Antalya" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["filter"]["to_city"], "Antalya");
    assert_eq!(body["matched"], 2);
    assert_eq!(body["rows"][0]["from_city"], "Ankara");
    assert_eq!(body["related"].as_array().unwrap().len(), 3);
    assert!(body.get("message").is_none());
}
