//! End-to-end integration tests for the reqgraph HTTP API.
//!
//! Tests exercise the full stack: HTTP request -> axum router -> handler ->
//! worker pool -> saver/loader -> SQLite -> HTTP response.
//!
//! Each test creates a fresh AppState backed by a unique temp SQLite database.
//! Tests use `tower::ServiceExt::oneshot` to send requests directly to the
//! router without starting a network server.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;

use reqgraph_core::kinds::{GraphNode, Requirement};
use reqgraph_core::{Graph, GraphDocument, NodeId};
use reqgraph_server::router::build_router;
use reqgraph_server::state::AppState;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Creates a fresh router backed by a unique temp database.
fn test_app() -> (TempDir, Router) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let state = AppState::open(&dir.path().join("graphs.db"), 2, Duration::from_secs(10))
        .expect("failed to create AppState");
    (dir, build_router(state))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap_or(json!(null));
    (status, json)
}

/// Sends a POST request with a raw body and returns (status, json).
async fn post_raw(app: &Router, path: &str, body: String) -> (StatusCode, serde_json::Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap(),
    )
    .await
}

async fn post_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post_raw(app, path, body.to_string()).await
}

/// Sends a GET request and returns (status, json).
async fn get_json(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    send(app, Request::builder().uri(path).body(Body::empty()).unwrap()).await
}

/// A graph titled `title` with two requirements under its root.
fn specs(title: &str) -> (NodeId, GraphDocument) {
    let graph = Graph::new();
    let root = graph.add(GraphNode {
        title: title.into(),
    });
    for name in ["R1", "R2"] {
        let req = graph.add(Requirement {
            title: name.into(),
            text: format!("{} text", name),
            functional: true,
        });
        graph.connect(&root, &req);
    }
    let id = root.id().unwrap();
    (id, GraphDocument::from_graph(&graph, id).unwrap())
}

/// Polls `GET /graph/{id}` until the stored graph has `nodes` nodes.
async fn wait_for_graph(app: &Router, id: NodeId, nodes: usize) -> serde_json::Value {
    for _ in 0..200 {
        let (status, body) = get_json(app, &format!("/graph/{}", id)).await;
        if status == StatusCode::OK && body["nodes"].as_array().map(Vec::len) == Some(nodes) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("graph {} was never fully stored", id);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_list_graphs_empty() {
    let (_dir, app) = test_app();
    let (status, body) = get_json(&app, "/graphs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_post_then_get_graph() {
    let (_dir, app) = test_app();
    let (id, doc) = specs("Specs");

    let (status, body) = post_json(
        &app,
        &format!("/graph/{}", id),
        serde_json::to_value(&doc).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "post failed: {:?}", body);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["nodes"], json!(3));

    let body = wait_for_graph(&app, id, 3).await;
    assert_eq!(body["root"], json!(id.to_string()));
    let fetched: GraphDocument = serde_json::from_value(body).unwrap();
    let root = fetched
        .nodes
        .iter()
        .find(|n| n.id == id)
        .expect("root in document");
    assert_eq!(root.down.len(), 2);

    let mut titles: Vec<String> = fetched
        .nodes
        .iter()
        .filter_map(|n| match &n.data {
            reqgraph_core::NodeData::Requirement(r) => Some(r.title.clone()),
            _ => None,
        })
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["R1".to_string(), "R2".to_string()]);
}

#[tokio::test]
async fn test_list_graphs_after_store() {
    let (_dir, app) = test_app();
    let (id, doc) = specs("Billing");
    let (status, _) = post_json(
        &app,
        &format!("/graph/{}", id),
        serde_json::to_value(&doc).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_graph(&app, id, 3).await;

    let (status, body) = get_json(&app, "/graphs").await;
    assert_eq!(status, StatusCode::OK);
    let graphs = body.as_array().unwrap();
    assert_eq!(graphs.len(), 1);
    let locator = &graphs[0]["ServerLocatorNode"];
    assert_eq!(locator["graphTitle"], json!("Billing"));
    assert_eq!(locator["graphUuid"], json!(id.to_string()));
    assert_eq!(
        locator["graphAddress"],
        json!(format!("http://localhost/graph/{}", id))
    );
}

#[tokio::test]
async fn test_get_unknown_graph_is_404() {
    let (_dir, app) = test_app();
    let (status, body) = get_json(&app, &format!("/graph/{}", NodeId::generate())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn test_invalid_id_is_400() {
    let (_dir, app) = test_app();
    let (status, body) = get_json(&app, "/graph/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("BAD_REQUEST"));
}

#[tokio::test]
async fn test_malformed_document_is_400() {
    let (_dir, app) = test_app();
    let path = format!("/graph/{}", NodeId::generate());

    let (status, _) = post_raw(&app, &path, "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(
        &app,
        &path,
        json!({ "root": "x", "nodes": [] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_kind_is_400() {
    let (_dir, app) = test_app();
    let id = NodeId::generate();
    let (status, body) = post_json(
        &app,
        &format!("/graph/{}", id),
        json!({
            "root": id.to_string(),
            "nodes": [{ "Spaceship": { "id": id.to_string() } }],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Spaceship"));
}

#[tokio::test]
async fn test_root_mismatch_is_400() {
    let (_dir, app) = test_app();
    let (_, doc) = specs("Specs");
    let other = NodeId::generate();
    let (status, body) = post_json(
        &app,
        &format!("/graph/{}", other),
        serde_json::to_value(&doc).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("does not match"));
}
