//! Analyzer configuration: the handful of externally-tunable knobs the spec
//! calls out (§4.6 widening threshold, §5 cancellation budget, §9 Open
//! Question (b) int-as-pointer compatibility). Parsed from an optional TOML
//! file and overridable from the CLI.

use serde::Deserialize;
use std::time::Duration;

/// How a `CL_TYPE_INT`-typed operand used in pointer position is handled at
/// variable-creation time (§9 Open Question (b)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerIntMode {
    /// Reject the program: a category-2 contract error is raised.
    Strict,
    /// Promote the operand's type to `CL_TYPE_PTR` and continue.
    Compatible,
}

impl Default for PointerIntMode {
    fn default() -> Self {
        PointerIntMode::Strict
    }
}

/// Externally-tunable analyzer knobs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Number of SHs a block's state container may hold before the FPD
    /// switches that block to join mode (§4.6).
    pub join_threshold: usize,
    /// How `CL_TYPE_INT`-as-pointer is handled (§9 Open Question (b)).
    pub pointer_int_mode: PointerIntMode,
    /// Wall-clock budget, in seconds, for analyzing a single function (§5).
    /// `0` means unbounded.
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            join_threshold: 32,
            pointer_int_mode: PointerIntMode::Strict,
            timeout_secs: 0,
        }
    }
}

impl AnalyzerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A config tuned for the CLI's textual-IR demonstration harness: looser
    /// typing (since fixtures routinely omit pointer types on literals) but
    /// otherwise identical defaults.
    pub fn cli_default() -> Self {
        Self {
            pointer_int_mode: PointerIntMode::Compatible,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }

    /// Parses a config from TOML content. Fields are all optional; missing
    /// fields fall back to [`AnalyzerConfig::default`].
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("invalid analyzer config: {e}"))
    }

    pub fn load_file(path: &std::path::Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_strict_and_unbounded() {
        let cfg = AnalyzerConfig::default();
        assert_eq!(cfg.pointer_int_mode, PointerIntMode::Strict);
        assert_eq!(cfg.timeout(), None);
        assert_eq!(cfg.join_threshold, 32);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg = AnalyzerConfig::parse("join_threshold = 8\n").unwrap();
        assert_eq!(cfg.join_threshold, 8);
        assert_eq!(cfg.pointer_int_mode, PointerIntMode::Strict);
    }

    #[test]
    fn parses_pointer_int_mode() {
        let cfg = AnalyzerConfig::parse("pointer_int_mode = \"compatible\"\n").unwrap();
        assert_eq!(cfg.pointer_int_mode, PointerIntMode::Compatible);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(AnalyzerConfig::parse("join_threshold = [oops").is_err());
    }

    #[test]
    fn load_file_round_trips_through_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shapecore.toml");
        std::fs::write(&path, "timeout_secs = 30\n").unwrap();
        let cfg = AnalyzerConfig::load_file(&path).unwrap();
        assert_eq!(cfg.timeout_secs, 30);
    }
}
