//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use fieldcrypt::{CipherEngine, FieldClassifier, KeyProvider, Migrator, RotationPolicy, RuleTable};

/// Application state shared across all request handlers.
///
/// Every field is `Arc`-backed or `Copy`, so Axum can clone the state for each
/// request without copying key material or rule tables.
#[derive(Clone, Debug)]
pub struct AppState {
    pub engine: CipherEngine,
    pub classifier: FieldClassifier,
    pub migrator: Migrator,
    pub rotation: RotationPolicy,
}

impl AppState {
    /// Wire the core components around one key provider.
    pub fn new(keys: Arc<dyn KeyProvider>, rules: Arc<RuleTable>, rotation: RotationPolicy) -> Self {
        let engine = CipherEngine::new(keys);
        Self {
            classifier: FieldClassifier::new(engine.clone(), rules),
            migrator: Migrator::new(engine.clone()),
            engine,
            rotation,
        }
    }

    /// `true` if the master key currently resolves.
    pub fn key_ready(&self) -> bool {
        self.engine.key_provider().master_key().is_ok()
    }
}
