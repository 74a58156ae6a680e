//! Engine configuration

use serde::{Deserialize, Serialize};

/// Tunables for the guest engine and the memory bridge.
///
/// A zero limit leaves the engine's own default in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Guest heap ceiling in bytes.
    pub memory_limit: usize,
    /// Guest stack ceiling in bytes.
    pub max_stack_size: usize,
    /// Allocation volume that triggers a guest collection cycle.
    pub gc_threshold: usize,
    /// New root-table registrations that trigger a reconcile when the
    /// outermost realm entry exits. Zero reconciles only on `collect`.
    pub reconcile_threshold: usize,
    /// Evaluate top-level source in strict mode.
    pub strict: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit: 0,
            max_stack_size: 1024 * 1024,
            gc_threshold: 0,
            reconcile_threshold: 256,
            strict: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
