//! Warning trail entries for recoverable conversion events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Kind of event recorded on the warning trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationType {
    /// A variable exceeded a missing or gap-fill threshold.
    ThresholdExceeded,
    /// Too few whole years met the thresholds.
    InsufficientYears,
    /// Variable dropped from the output.
    Dropped,
    /// Variable kept despite failing QC (include-all-evaluation override).
    ExcludedByPolicy,
    /// Missing samples filled from the reanalysis counterpart.
    ReanalysisFilled,
    /// Derived samples missing because an input sample is missing.
    MissingInput,
    /// Converted samples outside the catalog's valid range.
    OutOfRange,
    /// Input column not described by the catalog.
    IgnoredColumn,
}

impl ObservationType {
    /// Get a human-readable label for the observation type.
    pub fn label(&self) -> &'static str {
        match self {
            ObservationType::ThresholdExceeded => "Threshold Exceeded",
            ObservationType::InsufficientYears => "Insufficient Years",
            ObservationType::Dropped => "Dropped",
            ObservationType::ExcludedByPolicy => "Excluded By Policy",
            ObservationType::ReanalysisFilled => "Reanalysis Filled",
            ObservationType::MissingInput => "Missing Input",
            ObservationType::OutOfRange => "Out Of Range",
            ObservationType::IgnoredColumn => "Ignored Column",
        }
    }
}

/// Severity level of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Variable affected; conversion continues.
    Warning,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
        }
    }
}

/// Numbers backing an observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Number of affected samples (or years).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<usize>,
    /// Percentage of affected samples.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    /// Threshold the percentage was compared against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// A few affected row indices.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sample_rows: Vec<usize>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_occurrences(mut self, count: usize) -> Self {
        self.occurrences = Some(count);
        self
    }

    pub fn with_percentage(mut self, pct: f64) -> Self {
        self.percentage = Some(pct);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_sample_rows(mut self, rows: Vec<usize>) -> Self {
        self.sample_rows = rows;
        self
    }
}

/// One recoverable event raised while converting a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "type")]
    pub observation_type: ObservationType,
    pub severity: Severity,
    /// Output variable (or input column) concerned.
    pub variable: String,
    /// Human-readable description.
    pub description: String,
    pub evidence: Evidence,
    pub detected_at: DateTime<Utc>,
    /// Pipeline stage that raised it.
    pub detector: String,
}

impl Observation {
    pub fn new(
        observation_type: ObservationType,
        severity: Severity,
        variable: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            observation_type,
            severity,
            variable: variable.into(),
            description: description.into(),
            evidence: Evidence::new(),
            detected_at: Utc::now(),
            detector: String::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_detector(mut self, detector: impl Into<String>) -> Self {
        self.detector = detector.into();
        self
    }

    /// Emit this observation through `tracing`.
    pub fn log(&self) {
        let kind = self.observation_type.label();
        match (self.severity, self.observation_type) {
            (Severity::Warning, _) => {
                warn!(variable = %self.variable, kind, "{}", self.description)
            }
            (Severity::Info, ObservationType::IgnoredColumn) => {
                debug!(variable = %self.variable, kind, "{}", self.description)
            }
            (Severity::Info, _) => {
                info!(variable = %self.variable, kind, "{}", self.description)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_observation() {
        let obs = Observation::new(
            ObservationType::Dropped,
            Severity::Warning,
            "Qle",
            "gapfill_pct 35 > threshold 20",
        )
        .with_evidence(Evidence::new().with_percentage(35.0).with_threshold(20.0))
        .with_detector("quality_assessor");

        assert_eq!(obs.variable, "Qle");
        assert_eq!(obs.evidence.threshold, Some(20.0));
        assert_eq!(obs.detector, "quality_assessor");
    }

    #[test]
    fn test_serialises_type_tag() {
        let obs = Observation::new(ObservationType::OutOfRange, Severity::Warning, "Tair", "x");
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["type"], "out_of_range");
        assert_eq!(json["severity"], "warning");
        assert!(json["evidence"].get("sample_rows").is_none());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
    }
}
