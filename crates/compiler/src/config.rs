//! Compiler configuration.
//!
//! A plain builder-pattern struct so embedders (and the `micac` driver) can
//! tune a compilation without threading individual flags through the
//! pipeline.

/// Configuration for one compilation session.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Collapse literal-only binary expressions at compile time.
    pub fold_constants: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            fold_constants: true,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Enable or disable constant folding (builder pattern).
    pub fn with_constant_folding(mut self, fold: bool) -> Self {
        self.fold_constants = fold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fold_constants() {
        assert!(CompilerConfig::default().fold_constants);
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::new().with_constant_folding(false);
        assert!(!config.fold_constants);
    }
}
