//! HTTP/JSON server for stored requirement graphs.
//!
//! Lists the stored graphs, serves a graph as a JSON document and accepts
//! documents to persist. Persistence work runs on a shared storage worker
//! pool; this crate holds configuration, error mapping, state and routes.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
