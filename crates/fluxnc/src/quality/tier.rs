//! QC tiers and per-sample classification.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::resolve::ResolvedColumn;

/// Quality bucket of a non-missing sample, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcTier {
    Measured,
    Good,
    Medium,
    Poor,
    Reanalysis,
}

impl QcTier {
    /// Every tier, in order.
    pub const ALL: [QcTier; 5] = [
        QcTier::Measured,
        QcTier::Good,
        QcTier::Medium,
        QcTier::Poor,
        QcTier::Reanalysis,
    ];

    /// Tiers that count as gap-filled.
    pub const GAPFILLED: [QcTier; 4] = [
        QcTier::Good,
        QcTier::Medium,
        QcTier::Poor,
        QcTier::Reanalysis,
    ];

    /// Map a source QC flag to its tier.
    pub fn from_flag(flag: i64) -> Self {
        match flag {
            0 => QcTier::Measured,
            1 => QcTier::Good,
            2 => QcTier::Medium,
            _ => QcTier::Poor,
        }
    }

    /// Integer code written to `_qc` output variables.
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Short key used in attribute names.
    pub fn key(&self) -> &'static str {
        match self {
            QcTier::Measured => "measured",
            QcTier::Good => "good",
            QcTier::Medium => "medium",
            QcTier::Poor => "poor",
            QcTier::Reanalysis => "reanalysis",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QcTier::Measured => "measured",
            QcTier::Good => "good quality gap-fill",
            QcTier::Medium => "medium quality gap-fill",
            QcTier::Poor => "poor quality gap-fill",
            QcTier::Reanalysis => "reanalysis gap-fill",
        }
    }

    pub fn is_gapfilled(&self) -> bool {
        *self != QcTier::Measured
    }

    /// `0: measured; 1: good quality gap-fill; ...`
    pub fn describe_all() -> String {
        QcTier::ALL
            .iter()
            .map(|t| format!("{}: {}", t.code(), t.label()))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Classification of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleClass {
    Missing,
    Tier(QcTier),
}

impl SampleClass {
    /// `_qc` code, `None` for missing samples.
    pub fn code(&self) -> Option<i32> {
        match self {
            SampleClass::Missing => None,
            SampleClass::Tier(tier) => Some(tier.code()),
        }
    }
}

/// Classify every sample of a column.
///
/// Missing values are `Missing` whatever their flag says; reanalysis fills
/// win over the source flag; a present value with a missing flag is poor.
pub fn classify(column: &ResolvedColumn) -> Vec<SampleClass> {
    column
        .values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            if value.is_nan() {
                return SampleClass::Missing;
            }
            if column.is_reanalysis_filled(i) {
                return SampleClass::Tier(QcTier::Reanalysis);
            }
            let tier = match column.qc_flags.as_ref() {
                None => QcTier::Measured,
                Some(flags) => match flags.get(i).copied().flatten() {
                    Some(flag) => QcTier::from_flag(flag),
                    None => QcTier::Poor,
                },
            };
            SampleClass::Tier(tier)
        })
        .collect()
}

/// Counts of each class over a window of samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub total: usize,
    pub missing: usize,
    counts: [usize; 5],
}

impl TierCounts {
    pub fn tally(classes: &[SampleClass], window: Range<usize>) -> Self {
        let mut tally = TierCounts::default();
        for class in &classes[window] {
            tally.total += 1;
            match class {
                SampleClass::Missing => tally.missing += 1,
                SampleClass::Tier(tier) => tally.counts[tier.code() as usize] += 1,
            }
        }
        tally
    }

    pub fn count(&self, tier: QcTier) -> usize {
        self.counts[tier.code() as usize]
    }

    fn pct(&self, n: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            n as f64 * 100.0 / self.total as f64
        }
    }

    pub fn missing_pct(&self) -> f64 {
        self.pct(self.missing)
    }

    pub fn tier_pct(&self, tier: QcTier) -> f64 {
        self.pct(self.count(tier))
    }

    /// Sum of the gap-fill tier percentages.
    pub fn gapfilled_pct(&self) -> f64 {
        QcTier::GAPFILLED.iter().map(|t| self.tier_pct(*t)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VariableCatalog;

    fn column(values: Vec<f64>, flags: Option<Vec<Option<i64>>>) -> ResolvedColumn {
        let spec = VariableCatalog::fluxnet2015().by_output("Tair").unwrap().clone();
        ResolvedColumn {
            spec,
            column_index: 0,
            duplicate_of: None,
            values,
            qc_flags: flags,
            reanalysis: None,
            reanalysis_filled: None,
        }
    }

    #[test]
    fn test_flag_lookup() {
        assert_eq!(QcTier::from_flag(0), QcTier::Measured);
        assert_eq!(QcTier::from_flag(1), QcTier::Good);
        assert_eq!(QcTier::from_flag(2), QcTier::Medium);
        assert_eq!(QcTier::from_flag(3), QcTier::Poor);
        assert_eq!(QcTier::from_flag(7), QcTier::Poor);
    }

    #[test]
    fn test_classify_with_flags() {
        let col = column(
            vec![1.0, 2.0, f64::NAN, 4.0, 5.0],
            Some(vec![Some(0), Some(1), Some(0), None, Some(2)]),
        );
        assert_eq!(
            classify(&col),
            vec![
                SampleClass::Tier(QcTier::Measured),
                SampleClass::Tier(QcTier::Good),
                SampleClass::Missing,
                SampleClass::Tier(QcTier::Poor),
                SampleClass::Tier(QcTier::Medium),
            ]
        );
    }

    #[test]
    fn test_classify_without_flags_is_measured() {
        let col = column(vec![1.0, f64::NAN], None);
        assert_eq!(
            classify(&col),
            vec![SampleClass::Tier(QcTier::Measured), SampleClass::Missing]
        );
    }

    #[test]
    fn test_reanalysis_fill_overrides_flag() {
        let mut col = column(vec![f64::NAN, 2.0], Some(vec![Some(3), Some(0)]));
        col.reanalysis = Some(vec![1.0, 1.0]);
        col.apply_reanalysis_fill();
        assert_eq!(classify(&col)[0], SampleClass::Tier(QcTier::Reanalysis));
    }

    #[test]
    fn test_tally_percentages() {
        let classes = vec![
            SampleClass::Tier(QcTier::Measured),
            SampleClass::Tier(QcTier::Good),
            SampleClass::Tier(QcTier::Poor),
            SampleClass::Missing,
        ];
        let counts = TierCounts::tally(&classes, 0..4);
        assert_eq!(counts.missing_pct(), 25.0);
        assert_eq!(counts.tier_pct(QcTier::Good), 25.0);
        assert_eq!(counts.gapfilled_pct(), 50.0);

        let first_two = TierCounts::tally(&classes, 0..2);
        assert_eq!(first_two.missing_pct(), 0.0);
        assert_eq!(first_two.gapfilled_pct(), 50.0);
    }

    #[test]
    fn test_describe_all() {
        let text = QcTier::describe_all();
        assert!(text.starts_with("0: measured; 1: good quality gap-fill"));
        assert!(text.ends_with("4: reanalysis gap-fill"));
    }
}
