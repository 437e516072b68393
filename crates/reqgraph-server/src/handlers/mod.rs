//! HTTP handler modules for the reqgraph API.
//!
//! Handlers parse the request, hand the work to the storage pool and turn
//! the outcome into JSON. No persistence logic lives in handlers.

pub mod graphs;
