// src/core/metrics.rs

//! Defines and registers Prometheus metrics for control-service monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    /// The number of convergence agents currently connected.
    pub static ref CONNECTED_AGENTS: Gauge = register_gauge!(
        "convergence_control_connected_agents",
        "Number of currently connected convergence agents."
    )
    .unwrap();

    /// Total connections accepted on the agent port since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter = register_counter!(
        "convergence_control_connections_received_total",
        "Total number of agent connections accepted."
    )
    .unwrap();

    /// Total cluster-state broadcasts initiated (one per `ClusterStateAggregator`
    /// change notification, regardless of how many connections it reaches).
    pub static ref BROADCASTS_INITIATED_TOTAL: Counter = register_counter!(
        "convergence_control_broadcasts_initiated_total",
        "Total number of broadcast rounds initiated by a state change."
    )
    .unwrap();

    /// Total per-connection state sends actually written to the wire.
    pub static ref STATE_SENDS_TOTAL: Counter = register_counter!(
        "convergence_control_state_sends_total",
        "Total number of ClusterStatus sends written to connections."
    )
    .unwrap();

    /// Total times a broadcast was coalesced into an in-flight send rather than
    /// starting a new one.
    pub static ref BROADCASTS_COALESCED_TOTAL: Counter = register_counter!(
        "convergence_control_broadcasts_coalesced_total",
        "Total number of broadcasts coalesced onto an in-flight send."
    )
    .unwrap();

    /// Total send failures to agents, swallowed rather than tearing down the
    /// connection (see DESIGN.md's resolution of the "swallowed callRemote
    /// error" open question).
    pub static ref SEND_FAILURES_TOTAL: Counter = register_counter!(
        "convergence_control_send_failures_total",
        "Total number of per-connection sends that failed and were logged, not propagated."
    )
    .unwrap();

    /// Total NodeState updates applied from agents.
    pub static ref NODE_STATE_UPDATES_TOTAL: Counter = register_counter!(
        "convergence_control_node_state_updates_total",
        "Total number of NodeState commands applied to the cluster state aggregator."
    )
    .unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
