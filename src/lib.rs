//! # importq
//!
//! Leader-aware asynchronous import-entry processing engine: a persisted
//! work queue drained by a self-scheduling coordinator that dispatches
//! records to pluggable handlers across a bounded worker pool.
//!
//! The engine's collaborators are injected traits: [`store::WorkStore`]
//! (the persisted record table), [`handler::Handler`] (per-category
//! business logic), and [`cluster::ClusterOracle`] (is this node currently
//! responsible for the queue?). Producers talk to [`engine::Manager`].

pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod model;
pub mod store;
pub mod telemetry;
