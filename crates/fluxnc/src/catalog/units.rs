//! Unit reconciliation rules between source and target units.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FluxError, Result};

/// Offset between Kelvin and degrees Celsius.
pub const KELVIN_OFFSET: f64 = 273.15;

/// Surface pressure assumed when no pressure series is available (Pa).
pub const STANDARD_PRESSURE_PA: f64 = 101_325.0;

// "mm/30min", "mm/1800s", "mm/timestep", "mm/step"
static PER_STEP_ACCUMULATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^mm/(\d+(min|s)|timestep|step|ts)$").unwrap());

/// Conversion applied to every sample of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum UnitRule {
    /// Values pass through unchanged.
    Identity,
    /// `target = source + offset`.
    Offset { offset: f64 },
    /// `target = source * factor`.
    Scale { factor: f64 },
    /// Rate per second to amount per time step (`× step_seconds`).
    RateToAccumulation,
    /// Amount per time step to rate per second (`÷ step_seconds`).
    AccumulationToRate,
    /// Relative humidity (%) to specific humidity (kg/kg); needs air
    /// temperature and surface pressure.
    RelativeToSpecificHumidity,
}

/// Normalised unit families the rules know about.
#[derive(Debug, Clone, PartialEq)]
enum UnitKind {
    Kelvin,
    Celsius,
    Pressure(f64),
    PrecipRate,
    PrecipPerStep,
    Percent,
    MassRatio,
    MoleFraction,
    Other(String),
}

fn classify(unit: &str) -> UnitKind {
    let compact: String = unit
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .replace('°', "deg");

    match compact.as_str() {
        "K" | "kelvin" => UnitKind::Kelvin,
        "degC" | "C" | "degreesC" | "celsius" => UnitKind::Celsius,
        "Pa" => UnitKind::Pressure(1.0),
        "hPa" | "mbar" => UnitKind::Pressure(100.0),
        "kPa" => UnitKind::Pressure(1000.0),
        "mm/s" | "kg/m2/s" | "kgm-2s-1" | "mms-1" => UnitKind::PrecipRate,
        "mm" => UnitKind::PrecipPerStep,
        "%" | "percent" => UnitKind::Percent,
        "kg/kg" | "kgkg-1" => UnitKind::MassRatio,
        "ppm" | "umol/mol" | "µmol/mol" | "umolmol-1" => UnitKind::MoleFraction,
        other if PER_STEP_ACCUMULATION.is_match(other) => UnitKind::PrecipPerStep,
        other => UnitKind::Other(other.to_string()),
    }
}

impl UnitRule {
    /// Find the rule turning `source` units into `target` units.
    pub fn resolve(source: &str, target: &str) -> Result<Self> {
        let from = classify(source);
        let to = classify(target);

        let rule = match (&from, &to) {
            (a, b) if a == b => UnitRule::Identity,
            (UnitKind::Kelvin, UnitKind::Celsius) => UnitRule::Offset {
                offset: -KELVIN_OFFSET,
            },
            (UnitKind::Celsius, UnitKind::Kelvin) => UnitRule::Offset {
                offset: KELVIN_OFFSET,
            },
            (UnitKind::Pressure(a), UnitKind::Pressure(b)) => UnitRule::Scale { factor: a / b },
            (UnitKind::PrecipRate, UnitKind::PrecipPerStep) => UnitRule::RateToAccumulation,
            (UnitKind::PrecipPerStep, UnitKind::PrecipRate) => UnitRule::AccumulationToRate,
            (UnitKind::Percent, UnitKind::MassRatio) => UnitRule::RelativeToSpecificHumidity,
            _ => {
                return Err(FluxError::Catalog(format!(
                    "no conversion from '{}' to '{}'",
                    source, target
                )));
            }
        };

        Ok(rule)
    }

    /// Convert a single sample. `NaN` stays `NaN`.
    ///
    /// Humidity needs companion series and is handled by
    /// [`specific_humidity`]; here it passes through.
    pub fn apply(&self, value: f64, step_seconds: u32) -> f64 {
        match *self {
            UnitRule::Identity | UnitRule::RelativeToSpecificHumidity => value,
            UnitRule::Offset { offset } => value + offset,
            UnitRule::Scale { factor } => value * factor,
            UnitRule::RateToAccumulation => value * f64::from(step_seconds),
            UnitRule::AccumulationToRate => value / f64::from(step_seconds),
        }
    }

    /// Unit string recorded on the output variable.
    pub fn output_unit(&self, target: &str, step_seconds: u32) -> String {
        match self {
            UnitRule::RateToAccumulation if step_seconds % 60 == 0 => {
                format!("mm/{}min", step_seconds / 60)
            }
            UnitRule::RateToAccumulation => format!("mm/{}s", step_seconds),
            _ => target.to_string(),
        }
    }

    /// Whether the rule needs other variables to be converted first.
    pub fn needs_companions(&self) -> bool {
        matches!(self, UnitRule::RelativeToSpecificHumidity)
    }
}

/// Air temperature in degrees Celsius, given its unit string.
pub fn to_celsius(value: f64, unit: &str) -> f64 {
    match classify(unit) {
        UnitKind::Kelvin => value - KELVIN_OFFSET,
        _ => value,
    }
}

/// Pressure in Pa, given its unit string.
pub fn to_pascal(value: f64, unit: &str) -> f64 {
    match classify(unit) {
        UnitKind::Pressure(factor) => value * factor,
        _ => value,
    }
}

/// Specific humidity (kg/kg) from relative humidity (%), air temperature
/// (degC) and pressure (Pa). Magnus formula over water.
pub fn specific_humidity(rel_hum_pct: f64, air_temp_c: f64, pressure_pa: f64) -> f64 {
    if rel_hum_pct.is_nan() || air_temp_c.is_nan() || pressure_pa.is_nan() {
        return f64::NAN;
    }
    let sat_vapour_pa = 611.2 * (17.67 * air_temp_c / (air_temp_c + 243.5)).exp();
    let vapour_pa = rel_hum_pct / 100.0 * sat_vapour_pa;
    0.622 * vapour_pa / (pressure_pa - 0.378 * vapour_pa)
}
