//! Engine configuration.

use serde::{Deserialize, Serialize};

/// How tolerant the overlap policy is when a user edit lands inside a
/// candidate's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Accept agreement matches only within the configured bounds.
    #[default]
    Strict,
    /// Accept any agreement match, wherever it occurs in the candidate text.
    Lenient,
}

/// Tuning knobs for the rebase protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseConfig {
    #[serde(default)]
    pub resolution: Resolution,

    /// In strict mode, the farthest into the candidate text an agreement
    /// match may start.
    #[serde(default = "default_max_agreement_offset")]
    pub max_agreement_offset: usize,

    /// In strict mode, the longest user text accepted when the agreement
    /// match does not start at the very beginning of the candidate text.
    #[serde(default = "default_max_imperfect_agreement_length")]
    pub max_imperfect_agreement_length: usize,

    /// Re-check every surviving candidate end to end after rebasing.
    ///
    /// Off by default: the check also fires on user edits that are merely
    /// independent of the candidate, not in conflict with it. Test harnesses
    /// can turn it on, or call the verification routine directly.
    #[serde(default)]
    pub verify_rebased_edits: bool,
}

fn default_max_agreement_offset() -> usize {
    10
}

fn default_max_imperfect_agreement_length() -> usize {
    5
}

impl Default for RebaseConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            max_agreement_offset: default_max_agreement_offset(),
            max_imperfect_agreement_length: default_max_imperfect_agreement_length(),
            verify_rebased_edits: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RebaseConfig::default();
        assert_eq!(config.resolution, Resolution::Strict);
        assert_eq!(config.max_agreement_offset, 10);
        assert_eq!(config.max_imperfect_agreement_length, 5);
        assert!(!config.verify_rebased_edits);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: RebaseConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RebaseConfig::default());
    }

    #[test]
    fn test_resolution_serializes_lowercase() {
        let config: RebaseConfig = serde_json::from_str(r#"{"resolution": "lenient"}"#).unwrap();
        assert_eq!(config.resolution, Resolution::Lenient);
    }
}
