//! Box classification outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of identifying one box batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BoxClassification {
    /// QR code located and decoded to an experiment id
    Identified { experiment_id: u64 },

    /// QR code located but no preprocessing variant produced an experiment id
    ///
    /// `diagnostic` is the summed pixel intensity of the QR crop, kept for
    /// operator triage only. `payload` holds a decoded non-numeric string.
    Unreadable {
        diagnostic: u64,
        payload: Option<String>,
    },

    /// No QR code located in any sampled image
    NotFound,
}

impl BoxClassification {
    /// Junk reason for failed classifications
    pub fn junk_reason(&self) -> Option<JunkReason> {
        match self {
            BoxClassification::Identified { .. } => None,
            BoxClassification::Unreadable { .. } => Some(JunkReason::Unreadable),
            BoxClassification::NotFound => Some(JunkReason::NotFound),
        }
    }

    /// Diagnostic carried into the junk directory name
    pub fn diagnostic(&self) -> u64 {
        match self {
            BoxClassification::Unreadable { diagnostic, .. } => *diagnostic,
            _ => 0,
        }
    }
}

/// Why a batch ended up in junk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JunkReason {
    /// QR located, barcode undecodable → junk review
    Unreadable,
    /// No QR located → junk
    NotFound,
}

impl JunkReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            JunkReason::Unreadable => "unreadable",
            JunkReason::NotFound => "not_found",
        }
    }
}

impl fmt::Display for JunkReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_junk_reasons() {
        assert_eq!(
            BoxClassification::Identified { experiment_id: 1 }.junk_reason(),
            None
        );
        assert_eq!(
            BoxClassification::NotFound.junk_reason(),
            Some(JunkReason::NotFound)
        );
        let unreadable = BoxClassification::Unreadable {
            diagnostic: 99,
            payload: None,
        };
        assert_eq!(unreadable.junk_reason(), Some(JunkReason::Unreadable));
        assert_eq!(unreadable.diagnostic(), 99);
        assert_eq!(BoxClassification::NotFound.diagnostic(), 0);
    }

    #[test]
    fn test_serialization_tag() {
        let json = serde_json::to_string(&BoxClassification::Identified { experiment_id: 42 })
            .unwrap();
        assert_eq!(json, r#"{"outcome":"identified","experiment_id":42}"#);
    }
}
