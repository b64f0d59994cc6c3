//! Completeness and gap-fill assessment of resolved columns.
//!
//! Every sample is put in exactly one class (missing or a QC tier), the
//! shares are compared with the configured thresholds over the whole record
//! and over each whole calendar year, and each variable is kept, flagged or
//! dropped. Essential variables that fail abort the file.

mod observation;
mod thresholds;
mod tier;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::Category;
use crate::error::{FluxError, Result};
use crate::resolve::ResolvedColumn;
use crate::timegrid::TimeGrid;

pub use observation::{Evidence, Observation, ObservationType, Severity};
pub use thresholds::{ThresholdConfig, Violation, format_pct};
pub use tier::{QcTier, SampleClass, TierCounts, classify};

/// QC figures for one resolved column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Output variable name.
    pub variable: String,
    /// Share of missing samples over the whole record.
    pub missing_pct: f64,
    /// Share of each gap-fill tier over the whole record.
    pub gapfill_pct_by_tier: IndexMap<QcTier, f64>,
    /// Same as `missing_pct`.
    pub total_missing_pct: f64,
    /// Sum of `gapfill_pct_by_tier`.
    pub total_gapfilled_pct: f64,
    /// Whole calendar years in the record.
    pub evaluated_years: usize,
    /// Whole calendar years meeting the thresholds.
    pub passing_years: usize,
    pub passes_thresholds: bool,
    /// Why the variable failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What happens to a variable after assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "reason", rename_all = "snake_case")]
pub enum Disposition {
    /// Passed; goes to the output.
    Retain,
    /// Failed but kept on request; carries the reason.
    Flagged(String),
    /// Failed and left out of the output.
    Dropped(String),
}

impl Disposition {
    pub fn is_emitted(&self) -> bool {
        !matches!(self, Disposition::Dropped(_))
    }
}

/// Assessment of one column.
#[derive(Debug, Clone)]
pub struct ColumnAssessment {
    pub report: QualityReport,
    pub disposition: Disposition,
    /// Per-sample classes, aligned with the column's values.
    pub classes: Vec<SampleClass>,
}

/// Assessment of a whole file, aligned with the resolved column list.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub columns: Vec<ColumnAssessment>,
    /// Warning trail.
    pub observations: Vec<Observation>,
}

impl Assessment {
    pub fn reports(&self) -> impl Iterator<Item = &QualityReport> {
        self.columns.iter().map(|c| &c.report)
    }
}

/// Applies the threshold policy to resolved columns.
pub struct QualityAssessor<'a> {
    thresholds: &'a ThresholdConfig,
    include_all_eval: bool,
}

impl<'a> QualityAssessor<'a> {
    pub fn new(thresholds: &'a ThresholdConfig) -> Self {
        Self {
            thresholds,
            include_all_eval: false,
        }
    }

    /// Keep failing evaluation variables, flagged, instead of dropping them.
    pub fn include_all_eval(mut self, include: bool) -> Self {
        self.include_all_eval = include;
        self
    }

    /// Classify and score one column.
    pub fn report(&self, column: &ResolvedColumn, grid: &TimeGrid) -> (QualityReport, Vec<SampleClass>) {
        let classes = classify(column);
        let whole = TierCounts::tally(&classes, 0..classes.len());

        let mut violations: Vec<String> = self
            .thresholds
            .evaluate(&whole)
            .iter()
            .map(|v| v.to_string())
            .collect();

        let evaluated_years = grid.whole_years.len();
        let passing_years = grid
            .whole_years
            .iter()
            .filter_map(|year| grid.whole_year_rows(*year))
            .filter(|rows| {
                self.thresholds
                    .evaluate(&TierCounts::tally(&classes, rows.clone()))
                    .is_empty()
            })
            .count();

        let min_years = self.thresholds.min_whole_years as usize;
        if passing_years < min_years {
            violations.push(format!(
                "whole_years {} < min_whole_years {}",
                passing_years, min_years
            ));
        }

        let gapfill_pct_by_tier: IndexMap<QcTier, f64> = QcTier::GAPFILLED
            .iter()
            .map(|tier| (*tier, whole.tier_pct(*tier)))
            .collect();

        let report = QualityReport {
            variable: column.spec.output_name.clone(),
            missing_pct: whole.missing_pct(),
            total_missing_pct: whole.missing_pct(),
            total_gapfilled_pct: whole.gapfilled_pct(),
            gapfill_pct_by_tier,
            evaluated_years,
            passing_years,
            passes_thresholds: violations.is_empty(),
            reason: (!violations.is_empty()).then(|| violations.join("; ")),
        };

        (report, classes)
    }

    /// Assess every column and decide what is emitted.
    ///
    /// Fails with [`FluxError::ThresholdFailure`] when an essential variable
    /// fails, or when preferred evaluation variables are present and none
    /// of them passes.
    pub fn assess(&self, columns: &[ResolvedColumn], grid: &TimeGrid) -> Result<Assessment> {
        let mut assessed = Vec::with_capacity(columns.len());
        let mut observations = Vec::new();

        for column in columns {
            let spec = &column.spec;
            let (report, classes) = self.report(column, grid);
            debug!(
                variable = %spec.output_name,
                missing_pct = report.missing_pct,
                gapfilled_pct = report.total_gapfilled_pct,
                passing_years = report.passing_years,
                "assessed variable"
            );

            let disposition = match report.reason.clone() {
                None => Disposition::Retain,
                Some(reason) if spec.essential => {
                    return Err(FluxError::threshold(&spec.output_name, reason));
                }
                Some(reason) => {
                    let whole = TierCounts::tally(&classes, 0..classes.len());
                    observations.push(threshold_observation(column, &report, &whole, self.thresholds));

                    if self.include_all_eval && spec.category == Category::Evaluation {
                        let reason = format!("excluded: {}", reason);
                        observations.push(
                            Observation::new(
                                ObservationType::ExcludedByPolicy,
                                Severity::Warning,
                                &spec.output_name,
                                format!("kept on request despite failing QC ({})", reason),
                            )
                            .with_detector("quality_assessor"),
                        );
                        Disposition::Flagged(reason)
                    } else {
                        observations.push(
                            Observation::new(
                                ObservationType::Dropped,
                                Severity::Warning,
                                &spec.output_name,
                                format!("dropped from output: {}", reason),
                            )
                            .with_detector("quality_assessor"),
                        );
                        Disposition::Dropped(reason)
                    }
                }
            };

            assessed.push(ColumnAssessment {
                report,
                disposition,
                classes,
            });
        }

        self.check_preferred(columns, &assessed)?;

        for obs in &observations {
            obs.log();
        }

        Ok(Assessment {
            columns: assessed,
            observations,
        })
    }

    fn check_preferred(&self, columns: &[ResolvedColumn], assessed: &[ColumnAssessment]) -> Result<()> {
        let preferred: Vec<(&ResolvedColumn, &ColumnAssessment)> = columns
            .iter()
            .zip(assessed)
            .filter(|(c, _)| c.spec.preferred && c.spec.category == Category::Evaluation)
            .collect();

        if preferred.is_empty() || preferred.iter().any(|(_, a)| a.report.passes_thresholds) {
            return Ok(());
        }

        let names: Vec<&str> = preferred.iter().map(|(c, _)| c.output_name()).collect();
        let reasons: Vec<String> = preferred
            .iter()
            .filter_map(|(c, a)| a.report.reason.as_ref().map(|r| format!("{}: {}", c.output_name(), r)))
            .collect();
        Err(FluxError::threshold(
            names.join(", "),
            format!("no preferred evaluation variable passes ({})", reasons.join("; ")),
        ))
    }
}

fn threshold_observation(
    column: &ResolvedColumn,
    report: &QualityReport,
    whole: &TierCounts,
    thresholds: &ThresholdConfig,
) -> Observation {
    let insufficient_years = report.passing_years < thresholds.min_whole_years as usize
        && thresholds.evaluate(whole).is_empty();

    let (kind, evidence) = if insufficient_years {
        (
            ObservationType::InsufficientYears,
            Evidence::new()
                .with_occurrences(report.passing_years)
                .with_threshold(f64::from(thresholds.min_whole_years)),
        )
    } else {
        let mut evidence = Evidence::new().with_percentage(report.missing_pct);
        if let Some(first) = thresholds.evaluate(whole).into_iter().next() {
            evidence = Evidence::new()
                .with_percentage(first.value)
                .with_threshold(first.threshold);
        }
        (ObservationType::ThresholdExceeded, evidence)
    };

    Observation::new(
        kind,
        Severity::Warning,
        column.output_name(),
        report.reason.clone().unwrap_or_default(),
    )
    .with_evidence(evidence)
    .with_detector("quality_assessor")
}
