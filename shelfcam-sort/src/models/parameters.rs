//! Sorting parameters
//!
//! Named, overridable heuristics for batching, identification and lifecycle.
//! Defaults reproduce the behavior of the field-deployed sorter.

use crate::error::{SortError, SortResult};
use crate::services::preprocess::{default_variants, PreprocessVariant};
use serde::{Deserialize, Serialize};
use shelfcam_common::config::SortingConfig;
use std::fmt;
use std::str::FromStr;

/// Images sampled per batch while looking for a QR code
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Minimum locator score accepted as a QR detection
pub const DEFAULT_CONFIDENCE_CUTOFF: f32 = 0.1;

/// What happens to trailing images that do not fill a whole batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Discard with the run directory (logged with the count)
    #[default]
    Drop,
    /// Hold in `carried_over/` and batch first in the next run
    Carry,
    /// Move into `partial_batches/<run>/`
    Quarantine,
}

impl FromStr for RemainderPolicy {
    type Err = SortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(RemainderPolicy::Drop),
            "carry" => Ok(RemainderPolicy::Carry),
            "quarantine" => Ok(RemainderPolicy::Quarantine),
            other => Err(SortError::InvalidParameter(format!(
                "unknown remainder policy '{}' (expected drop, carry or quarantine)",
                other
            ))),
        }
    }
}

impl fmt::Display for RemainderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemainderPolicy::Drop => "drop",
            RemainderPolicy::Carry => "carry",
            RemainderPolicy::Quarantine => "quarantine",
        };
        f.write_str(s)
    }
}

/// Sorting heuristics for one pipeline instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortParameters {
    /// Boxes on each shelf; batch size is `boxes_per_shelf × shelves`
    pub boxes_per_shelf: u32,

    /// Images sampled per batch (without replacement)
    pub sample_size: usize,

    /// Minimum locator confidence
    pub confidence_cutoff: f32,

    /// Fixed RNG seed for reproducible sampling; random when `None`
    pub sample_seed: Option<u64>,

    /// Decode attempts in order; first non-empty decode wins
    pub variants: Vec<PreprocessVariant>,

    pub remainder_policy: RemainderPolicy,

    /// Consecutive runs without growth before an experiment is finished
    pub grace_runs: u32,
}

impl Default for SortParameters {
    fn default() -> Self {
        Self {
            boxes_per_shelf: 1,
            sample_size: DEFAULT_SAMPLE_SIZE,
            confidence_cutoff: DEFAULT_CONFIDENCE_CUTOFF,
            sample_seed: None,
            variants: default_variants(),
            remainder_policy: RemainderPolicy::default(),
            grace_runs: 1,
        }
    }
}

impl SortParameters {
    /// Apply the `[sorting]` TOML section over the defaults
    pub fn from_config(config: &SortingConfig) -> SortResult<Self> {
        let mut params = Self::default();

        if let Some(boxes) = config.boxes_per_shelf {
            params.boxes_per_shelf = boxes;
        }
        if let Some(size) = config.sample_size {
            params.sample_size = size;
        }
        if let Some(cutoff) = config.confidence_cutoff {
            params.confidence_cutoff = cutoff;
        }
        params.sample_seed = config.sample_seed;
        if let Some(policy) = &config.remainder_policy {
            params.remainder_policy = policy.parse()?;
        }
        if let Some(variants) = &config.variants {
            params.variants = variants
                .iter()
                .map(|v| v.parse())
                .collect::<SortResult<Vec<_>>>()?;
        }
        if let Some(grace) = config.grace_runs {
            params.grace_runs = grace;
        }

        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> SortResult<()> {
        if self.boxes_per_shelf == 0 {
            return Err(SortError::InvalidParameter(
                "boxes_per_shelf must be at least 1".to_string(),
            ));
        }
        if self.sample_size == 0 {
            return Err(SortError::InvalidParameter(
                "sample_size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_cutoff) {
            return Err(SortError::InvalidParameter(format!(
                "confidence_cutoff {} outside [0, 1]",
                self.confidence_cutoff
            )));
        }
        if self.variants.is_empty() {
            return Err(SortError::InvalidParameter(
                "at least one preprocessing variant is required".to_string(),
            ));
        }
        if self.grace_runs == 0 {
            return Err(SortError::InvalidParameter(
                "grace_runs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = SortParameters::default();
        params.validate().unwrap();
        assert_eq!(params.sample_size, 10);
        assert_eq!(params.variants.len(), 7);
        assert_eq!(params.grace_runs, 1);
        assert_eq!(params.remainder_policy, RemainderPolicy::Drop);
    }

    #[test]
    fn test_from_config_overrides() {
        let config = SortingConfig {
            boxes_per_shelf: Some(4),
            remainder_policy: Some("Quarantine".to_string()),
            variants: Some(vec!["otsu".to_string(), "raw".to_string()]),
            grace_runs: Some(3),
            ..Default::default()
        };
        let params = SortParameters::from_config(&config).unwrap();
        assert_eq!(params.boxes_per_shelf, 4);
        assert_eq!(params.remainder_policy, RemainderPolicy::Quarantine);
        assert_eq!(
            params.variants,
            vec![PreprocessVariant::Otsu, PreprocessVariant::Raw]
        );
        assert_eq!(params.grace_runs, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_boxes = SortingConfig {
            boxes_per_shelf: Some(0),
            ..Default::default()
        };
        assert!(SortParameters::from_config(&zero_boxes).is_err());

        let bad_policy = SortingConfig {
            remainder_policy: Some("keep".to_string()),
            ..Default::default()
        };
        assert!(SortParameters::from_config(&bad_policy).is_err());

        let no_variants = SortingConfig {
            variants: Some(Vec::new()),
            ..Default::default()
        };
        assert!(SortParameters::from_config(&no_variants).is_err());
    }
}
