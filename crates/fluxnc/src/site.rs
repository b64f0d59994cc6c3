//! Per-site metadata written as scalar variables and global attributes.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FluxError, Result};

/// Sentinel some site tables use for "unknown".
const SITE_SENTINEL: f64 = -9999.0;

/// Descriptive metadata for one tower site.
///
/// Optional numeric fields are unset when absent, non-finite or `-9999`;
/// optional text fields are unset when absent, empty or `NA`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteMetadata {
    pub latitude: f64,
    pub longitude: f64,
    pub site_code: String,
    pub long_sitename: String,
    pub dataset_version: String,
    /// Data-policy tier of the site.
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    /// Metres above sea level.
    #[serde(default, deserialize_with = "optional_number", skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    /// Measurement height, metres.
    #[serde(default, deserialize_with = "optional_number", skip_serializing_if = "Option::is_none")]
    pub tower_height: Option<f64>,
    /// Metres.
    #[serde(default, deserialize_with = "optional_number", skip_serializing_if = "Option::is_none")]
    pub canopy_height: Option<f64>,
    /// IGBP vegetation class code, e.g. `ENF`.
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub short_veg_type: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub long_veg_type: Option<String>,
    /// Millimetres per year.
    #[serde(default, deserialize_with = "optional_number", skip_serializing_if = "Option::is_none")]
    pub mean_annual_precip: Option<f64>,
}

fn usable_number(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != SITE_SENTINEL)
}

fn usable_text(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("na"))
}

fn optional_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(usable_number(Option::<f64>::deserialize(deserializer)?))
}

fn optional_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(usable_text(Option::<String>::deserialize(deserializer)?))
}

impl SiteMetadata {
    /// Site with only the required fields set.
    pub fn new(
        site_code: impl Into<String>,
        long_sitename: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            latitude,
            longitude,
            site_code: site_code.into(),
            long_sitename: long_sitename.into(),
            dataset_version: String::new(),
            tier: None,
            elevation: None,
            tower_height: None,
            canopy_height: None,
            short_veg_type: None,
            long_veg_type: None,
            mean_annual_precip: None,
        }
    }

    /// Load from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| FluxError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let site: SiteMetadata = serde_json::from_reader(BufReader::new(file))?;
        site.validate()?;
        Ok(site)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let site: SiteMetadata = serde_json::from_str(json)?;
        site.validate()?;
        Ok(site)
    }

    /// Check coordinates and the site code.
    pub fn validate(&self) -> Result<()> {
        if self.site_code.trim().is_empty() {
            return Err(FluxError::Config("site_code must not be empty".to_string()));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(FluxError::Config(format!(
                "latitude {} of site '{}' is outside [-90, 90]",
                self.latitude, self.site_code
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(FluxError::Config(format!(
                "longitude {} of site '{}' is outside [-180, 180]",
                self.longitude, self.site_code
            )));
        }
        Ok(())
    }

    pub fn with_dataset_version(mut self, version: impl Into<String>) -> Self {
        self.dataset_version = version.into();
        self
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = usable_text(Some(tier.into()));
        self
    }

    pub fn with_elevation(mut self, metres: f64) -> Self {
        self.elevation = usable_number(Some(metres));
        self
    }

    pub fn with_tower_height(mut self, metres: f64) -> Self {
        self.tower_height = usable_number(Some(metres));
        self
    }

    pub fn with_canopy_height(mut self, metres: f64) -> Self {
        self.canopy_height = usable_number(Some(metres));
        self
    }

    pub fn with_vegetation(mut self, short: impl Into<String>, long: impl Into<String>) -> Self {
        self.short_veg_type = usable_text(Some(short.into()));
        self.long_veg_type = usable_text(Some(long.into()));
        self
    }

    pub fn with_mean_annual_precip(mut self, mm: f64) -> Self {
        self.mean_annual_precip = usable_number(Some(mm));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_unset_optionals() {
        let site = SiteMetadata::from_json_str(
            r#"{
                "latitude": 51.3,
                "longitude": 4.5,
                "site_code": "BE-Bra",
                "long_sitename": "Brasschaat",
                "dataset_version": "FLUXNET2015",
                "tier": "NA",
                "elevation": 16,
                "canopy_height": -9999,
                "short_veg_type": "MF",
                "long_veg_type": "",
                "mean_annual_precip": null
            }"#,
        )
        .unwrap();

        assert_eq!(site.elevation, Some(16.0));
        assert_eq!(site.canopy_height, None);
        assert_eq!(site.tower_height, None);
        assert_eq!(site.tier, None);
        assert_eq!(site.short_veg_type.as_deref(), Some("MF"));
        assert_eq!(site.long_veg_type, None);
        assert_eq!(site.mean_annual_precip, None);
    }

    #[test]
    fn test_required_fields() {
        let err = SiteMetadata::from_json_str(r#"{"latitude": 1.0, "longitude": 2.0}"#).unwrap_err();
        assert!(matches!(err, FluxError::Json(_)));
    }

    #[test]
    fn test_coordinates_validated() {
        let site = SiteMetadata::new("XX-Bad", "Bad", 95.0, 0.0);
        assert!(matches!(site.validate(), Err(FluxError::Config(_))));
        assert!(SiteMetadata::new("XX-Ok", "Ok", -45.0, 170.0).validate().is_ok());
        assert!(SiteMetadata::new("  ", "Blank", 0.0, 0.0).validate().is_err());
    }

    #[test]
    fn test_builders_filter_sentinels() {
        let site = SiteMetadata::new("AU-Tum", "Tumbarumba", -35.66, 148.15)
            .with_canopy_height(-9999.0)
            .with_elevation(f64::NAN)
            .with_tower_height(70.0)
            .with_vegetation("EBF", "Evergreen Broadleaf Forest");
        assert_eq!(site.canopy_height, None);
        assert_eq!(site.elevation, None);
        assert_eq!(site.tower_height, Some(70.0));
        assert_eq!(site.long_veg_type.as_deref(), Some("Evergreen Broadleaf Forest"));
    }
}
