// src/cache.rs

//! The encoding cache: memoizes the wire encoding of the
//! `configuration`/`state` pair for the duration of a single broadcast round
//! so that sending the same snapshot to N connections encodes it once, not
//! N times. Scoped rather than global — `with_encoding_cache` activates it
//! for the closure's duration and guarantees teardown via an RAII guard even
//! if the closure panics.

use crate::core::errors::ProtocolError;
use crate::core::model::{Deployment, DeploymentState, wire_encode};
use bytes::Bytes;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Configuration(Deployment),
    State(DeploymentState),
}

/// A per-broadcast cache of already-encoded configuration/state payloads.
/// Not `Send`/`Sync` by design: it is only ever touched from the single task
/// that owns a `ControlFanout` broadcast round, so it carries no internal
/// synchronization.
#[derive(Debug, Default)]
pub struct EncodingCache {
    entries: Option<HashMap<CacheKey, Bytes>>,
}

impl EncodingCache {
    pub fn new() -> Self {
        Self { entries: None }
    }

    fn activate(&mut self) {
        self.entries = Some(HashMap::new());
    }

    fn deactivate(&mut self) {
        self.entries = None;
    }

    pub fn is_active(&self) -> bool {
        self.entries.is_some()
    }

    pub fn encode_configuration(&mut self, deployment: &Deployment) -> Result<Bytes, ProtocolError> {
        self.encode(CacheKey::Configuration(deployment.clone()), || wire_encode(deployment))
    }

    pub fn encode_state(&mut self, state: &DeploymentState) -> Result<Bytes, ProtocolError> {
        self.encode(CacheKey::State(state.clone()), || wire_encode(state))
    }

    fn encode(
        &mut self,
        key: CacheKey,
        encode_fn: impl FnOnce() -> Result<Bytes, ProtocolError>,
    ) -> Result<Bytes, ProtocolError> {
        if let Some(map) = &self.entries {
            if let Some(existing) = map.get(&key) {
                return Ok(existing.clone());
            }
        }
        let encoded = encode_fn()?;
        if let Some(map) = &mut self.entries {
            map.insert(key, encoded.clone());
        }
        Ok(encoded)
    }
}

/// RAII guard that deactivates an `EncodingCache` when the broadcast round
/// that activated it ends, regardless of how it ends.
struct EncodingCacheScope<'a> {
    cache: &'a mut EncodingCache,
}

impl<'a> EncodingCacheScope<'a> {
    fn new(cache: &'a mut EncodingCache) -> Self {
        cache.activate();
        Self { cache }
    }
}

impl<'a> Deref for EncodingCacheScope<'a> {
    type Target = EncodingCache;
    fn deref(&self) -> &EncodingCache {
        self.cache
    }
}

impl<'a> DerefMut for EncodingCacheScope<'a> {
    fn deref_mut(&mut self) -> &mut EncodingCache {
        self.cache
    }
}

impl<'a> Drop for EncodingCacheScope<'a> {
    fn drop(&mut self) {
        self.cache.deactivate();
    }
}

/// Runs `f` with `cache` activated, guaranteeing it is deactivated again
/// before this function returns (including on panic).
pub fn with_encoding_cache<R>(
    cache: &mut EncodingCache,
    f: impl FnOnce(&mut EncodingCache) -> R,
) -> R {
    let mut scope = EncodingCacheScope::new(cache);
    f(scope.cache)
}
