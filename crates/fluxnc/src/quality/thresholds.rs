//! QC threshold configuration and the pass/fail policy.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::tier::{QcTier, TierCounts};
use crate::error::{FluxError, Result};

/// Limits a variable must respect to be kept.
///
/// All percentages are maxima over the evaluated window (0-100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Maximum share of missing samples.
    pub missing_pct_max: f64,
    /// Maximum share of gap-filled samples, all tiers together. When set,
    /// the per-tier limits below are not consulted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gapfill_all_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gapfill_good_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gapfill_med_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gapfill_poor_max: Option<f64>,
    /// Whole calendar years that must pass.
    ///
    /// A whole year holds every step from 1 January 00:00 to the next
    /// 1 January, so 17520 half-hourly rows make exactly one year and can
    /// never satisfy a value of 2; two years need 35040 rows (35088 when
    /// one of them is a leap year). Zero disables the check, for records
    /// shorter than a year.
    pub min_whole_years: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            missing_pct_max: 20.0,
            gapfill_all_max: None,
            gapfill_good_max: None,
            gapfill_med_max: None,
            gapfill_poor_max: None,
            min_whole_years: 1,
        }
    }
}

/// One broken limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Which figure was compared (`missing_pct`, `gapfill_pct`, `gapfill_good_pct`, ...).
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} > threshold {}",
            self.metric,
            format_pct(self.value),
            format_pct(self.threshold)
        )
    }
}

/// Render a percentage with at most two decimals, trailing zeros trimmed.
pub fn format_pct(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{}", rounded)
}

impl ThresholdConfig {
    pub fn new(missing_pct_max: f64) -> Self {
        Self {
            missing_pct_max,
            ..Self::default()
        }
    }

    pub fn with_gapfill_all(mut self, max: f64) -> Self {
        self.gapfill_all_max = Some(max);
        self
    }

    pub fn with_gapfill_good(mut self, max: f64) -> Self {
        self.gapfill_good_max = Some(max);
        self
    }

    pub fn with_gapfill_med(mut self, max: f64) -> Self {
        self.gapfill_med_max = Some(max);
        self
    }

    pub fn with_gapfill_poor(mut self, max: f64) -> Self {
        self.gapfill_poor_max = Some(max);
        self
    }

    pub fn with_min_whole_years(mut self, years: u32) -> Self {
        self.min_whole_years = years;
        self
    }

    /// Reject percentages outside 0-100.
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("missing_pct_max", Some(self.missing_pct_max)),
            ("gapfill_all_max", self.gapfill_all_max),
            ("gapfill_good_max", self.gapfill_good_max),
            ("gapfill_med_max", self.gapfill_med_max),
            ("gapfill_poor_max", self.gapfill_poor_max),
        ];
        for (name, value) in limits {
            if let Some(v) = value {
                if !(0.0..=100.0).contains(&v) {
                    return Err(FluxError::Config(format!(
                        "{} must be within 0-100, got {}",
                        name, v
                    )));
                }
            }
        }
        Ok(())
    }

    /// Per-tier limits that are actually consulted.
    fn tier_limits(&self) -> Vec<(QcTier, f64)> {
        if self.gapfill_all_max.is_some() {
            return Vec::new();
        }
        [
            (QcTier::Good, self.gapfill_good_max),
            (QcTier::Medium, self.gapfill_med_max),
            (QcTier::Poor, self.gapfill_poor_max),
        ]
        .into_iter()
        .filter_map(|(tier, max)| max.map(|m| (tier, m)))
        .collect()
    }

    /// Compare a window's counts against the limits.
    ///
    /// Missing share is always checked. The aggregate gap-fill limit, when
    /// present, replaces every per-tier limit; otherwise each supplied
    /// per-tier limit is checked on its own.
    pub fn evaluate(&self, counts: &TierCounts) -> Vec<Violation> {
        let mut violations = Vec::new();

        let missing = counts.missing_pct();
        if missing > self.missing_pct_max {
            violations.push(Violation {
                metric: "missing_pct".to_string(),
                value: missing,
                threshold: self.missing_pct_max,
            });
        }

        if let Some(max) = self.gapfill_all_max {
            let gapfilled = counts.gapfilled_pct();
            if gapfilled > max {
                violations.push(Violation {
                    metric: "gapfill_pct".to_string(),
                    value: gapfilled,
                    threshold: max,
                });
            }
        }

        for (tier, max) in self.tier_limits() {
            let pct = counts.tier_pct(tier);
            if pct > max {
                violations.push(Violation {
                    metric: format!("gapfill_{}_pct", tier.key()),
                    value: pct,
                    threshold: max,
                });
            }
        }

        violations
    }

    /// Readable rendering of the limits in force.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("missing <= {}%", format_pct(self.missing_pct_max))];

        match self.gapfill_all_max {
            Some(max) => {
                let mut text = format!("all gap-filled <= {}%", format_pct(max));
                let ignored = [
                    self.gapfill_good_max,
                    self.gapfill_med_max,
                    self.gapfill_poor_max,
                ]
                .iter()
                .any(Option::is_some);
                if ignored {
                    text.push_str(" (per-tier thresholds not applied)");
                }
                parts.push(text);
            }
            None => {
                let tiers = self.tier_limits();
                if tiers.is_empty() {
                    parts.push("gap-filling not limited".to_string());
                }
                for (tier, max) in tiers {
                    parts.push(format!("{} gap-filled <= {}%", tier.key(), format_pct(max)));
                }
            }
        }

        parts.push(format!("min whole years {}", self.min_whole_years));
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::tier::SampleClass;

    fn counts(measured: usize, good: usize, medium: usize, poor: usize, missing: usize) -> TierCounts {
        let mut classes = Vec::new();
        classes.extend(std::iter::repeat_n(SampleClass::Tier(QcTier::Measured), measured));
        classes.extend(std::iter::repeat_n(SampleClass::Tier(QcTier::Good), good));
        classes.extend(std::iter::repeat_n(SampleClass::Tier(QcTier::Medium), medium));
        classes.extend(std::iter::repeat_n(SampleClass::Tier(QcTier::Poor), poor));
        classes.extend(std::iter::repeat_n(SampleClass::Missing, missing));
        let n = classes.len();
        TierCounts::tally(&classes, 0..n)
    }

    #[test]
    fn test_missing_always_checked() {
        let cfg = ThresholdConfig::new(10.0).with_gapfill_all(100.0);
        let v = cfg.evaluate(&counts(80, 0, 0, 0, 20));
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].to_string(), "missing_pct 20 > threshold 10");
    }

    #[test]
    fn test_aggregate_overrides_tiers() {
        // 30% good gap-fill; tier limit 5 would fail, aggregate 40 passes
        let cfg = ThresholdConfig::new(50.0)
            .with_gapfill_all(40.0)
            .with_gapfill_good(5.0);
        assert!(cfg.evaluate(&counts(70, 30, 0, 0, 0)).is_empty());

        let cfg = ThresholdConfig::new(50.0)
            .with_gapfill_all(20.0)
            .with_gapfill_good(90.0);
        let v = cfg.evaluate(&counts(65, 35, 0, 0, 0));
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].to_string(), "gapfill_pct 35 > threshold 20");
    }

    #[test]
    fn test_per_tier_checked_independently() {
        let cfg = ThresholdConfig::new(50.0)
            .with_gapfill_good(50.0)
            .with_gapfill_poor(5.0);
        // medium is unlimited
        assert!(cfg.evaluate(&counts(10, 40, 50, 0, 0)).is_empty());
        let v = cfg.evaluate(&counts(80, 10, 0, 10, 0));
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].metric, "gapfill_poor_pct");
    }

    #[test]
    fn test_equal_to_threshold_passes() {
        let cfg = ThresholdConfig::new(25.0).with_gapfill_all(25.0);
        assert!(cfg.evaluate(&counts(50, 25, 0, 0, 25)).is_empty());
    }

    #[test]
    fn test_validate_range() {
        assert!(ThresholdConfig::default().validate().is_ok());
        assert!(ThresholdConfig::new(120.0).validate().is_err());
        assert!(ThresholdConfig::new(10.0).with_gapfill_good(-1.0).validate().is_err());
    }

    #[test]
    fn test_describe() {
        let cfg = ThresholdConfig::new(15.0)
            .with_gapfill_all(20.0)
            .with_gapfill_good(5.0)
            .with_min_whole_years(2);
        assert_eq!(
            cfg.describe(),
            "missing <= 15%; all gap-filled <= 20% (per-tier thresholds not applied); min whole years 2"
        );

        let cfg = ThresholdConfig::new(10.0).with_gapfill_med(12.5);
        assert_eq!(
            cfg.describe(),
            "missing <= 10%; medium gap-filled <= 12.5%; min whole years 1"
        );
    }

    #[test]
    fn test_format_pct() {
        assert_eq!(format_pct(35.0), "35");
        assert_eq!(format_pct(33.3333), "33.33");
    }
}
