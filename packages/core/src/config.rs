//! Engine configuration.

/// Configuration for an [`Engine`](crate::Engine).
///
/// # Example
///
/// ```rust
/// use cursorstore_core::{Engine, EngineConfig};
///
/// let engine = Engine::new(EngineConfig {
///     memoize: false,
///     ..Default::default()
/// });
/// assert!(!engine.config().memoize);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Check that cursors handed to subscriptions belong to this engine, and
    /// that batch scopes are balanced.
    pub dev_mode: bool,
    /// Cache read results per cursor until the store's version moves.
    pub memoize: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dev_mode: cfg!(debug_assertions),
            memoize: true,
        }
    }
}

impl EngineConfig {
    /// Production settings: memoized reads, no ownership checks.
    pub fn production() -> Self {
        Self {
            dev_mode: false,
            memoize: true,
        }
    }

    /// Development settings: memoized reads, ownership checks enabled.
    pub fn development() -> Self {
        Self {
            dev_mode: true,
            memoize: true,
        }
    }
}
