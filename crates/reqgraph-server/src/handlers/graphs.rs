//! Graph handlers (list, fetch, store).

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;

use reqgraph_core::kinds::ServerLocatorNode;
use reqgraph_core::{GraphDocument, Node, NodeId, WireNode};
use reqgraph_storage::{GraphFactory, GraphLocator, SaveTask};

use crate::error::ApiError;
use crate::state::AppState;

/// Lists every stored graph as a `ServerLocatorNode`.
///
/// `GET /graphs`
pub async fn list_graphs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<WireNode>>, ApiError> {
    let db = state.db.clone();
    let locator = tokio::task::spawn_blocking(move || GraphLocator::query(&db)).await??;

    let base = base_url(&headers);
    let mut nodes = Vec::with_capacity(locator.len());
    for (id, title) in locator.graphs() {
        let node = Node::of(ServerLocatorNode {
            graph_uuid: Some(*id),
            graph_title: title.clone(),
            graph_address: format!("{}/graph/{}", base, id),
        });
        node.init();
        nodes.push(WireNode::from_node(&node)?);
    }
    Ok(Json(nodes))
}

/// Loads the graph reachable from `id`.
///
/// `GET /graph/{id}`
pub async fn get_graph(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GraphDocument>, ApiError> {
    let id = NodeId::parse(&id)?;
    let factory = GraphFactory::new(state.db.clone(), id);
    state.pool.enqueue(factory.clone())?;

    let waiting = factory.clone();
    let timeout = state.load_timeout;
    let loaded = tokio::task::spawn_blocking(move || waiting.wait(timeout)).await?;
    if !loaded {
        return Err(ApiError::Timeout(format!(
            "graph {} did not load within {}s",
            id,
            timeout.as_secs()
        )));
    }
    if factory.root().is_none() {
        return Err(ApiError::NotFound(format!("graph {}", id)));
    }
    tracing::debug!(root = %id, nodes = factory.graph().len(), "graph served");
    Ok(Json(GraphDocument::from_graph(&factory.graph(), id)?))
}

/// Stores a graph document rooted at `id`. The save runs in the background.
///
/// `POST /graph/{id}`
pub async fn post_graph(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let id = NodeId::parse(&id)?;
    let doc: GraphDocument = serde_json::from_str(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed graph document: {}", e)))?;
    if doc.root != id {
        return Err(ApiError::BadRequest(format!(
            "document root {} does not match {}",
            doc.root, id
        )));
    }

    let graph = std::sync::Arc::new(doc.into_graph()?);
    let nodes = graph.len();
    let task = SaveTask::tree(state.db.clone(), graph, id);
    state.pool.enqueue(task)?;
    tracing::info!(root = %id, nodes, "graph save queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "root": id,
            "nodes": nodes,
        })),
    ))
}

/// `scheme://host` of the incoming request.
fn base_url(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}", proto, host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn base_url_defaults_and_forwarded_proto() {
        assert_eq!(base_url(&HeaderMap::new()), "http://localhost");

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("specs.example:8080"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(base_url(&headers), "https://specs.example:8080");
    }
}
