// src/core/mod.rs

//! The central module containing the core data model, error type, and
//! metrics for the control-plane service.

pub mod errors;
pub mod metrics;
pub mod model;

pub use errors::ProtocolError;
pub use model::{
    ChangeSource, ChangeSourceId, ClusterStateAggregator, ClusterStateChange, ConfigChangeListener,
    ConfigurationStore, Deployment, DeploymentState, InMemoryClusterStateAggregator,
    InMemoryConfigurationStore, wire_decode, wire_encode,
};
