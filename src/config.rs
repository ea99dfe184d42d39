// ⚙️ Configuration - Survey vocabulary, report thresholds, output names
// Optional TOML file; every field has a default matching the live form.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// SURVEY VOCABULARY
// ============================================================================

/// The exact answer strings the form produces.
///
/// Classification compares trimmed answers against these, so a form
/// wording change only needs a config edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyVocabulary {
    /// "Yes" (used by `is_registered` and `another_car`)
    pub yes: String,

    /// "No / don't know" answer to `is_registered`
    pub not_registered: String,

    pub action_replace: String,
    pub action_add_second: String,
    pub action_remove: String,
}

impl Default for SurveyVocabulary {
    fn default() -> Self {
        SurveyVocabulary {
            yes: "כן".to_string(),
            not_registered: "לא/לא יודע".to_string(),
            action_replace: "להחליף רכב קיים ברכב חדש".to_string(),
            action_add_second: "להוסיף רכב שני למשפחה".to_string(),
            action_remove: "להסיר רכב קיים".to_string(),
        }
    }
}

// ============================================================================
// SOURCE / REPORTS / OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// chrono format of the form's timestamp column
    pub timestamp_format: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            timestamp_format: "%d/%m/%Y %H:%M:%S".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Households with more cars than this go to review
    pub max_cars_per_household: usize,

    /// Households first seen after this date count as new
    pub new_household_cutoff: NaiveDate,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            max_cars_per_household: 2,
            new_household_cutoff: NaiveDate::from_ymd_opt(2022, 5, 1).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub lpr_file: String,
    pub over_capacity_file: String,
    pub new_households_file: String,
    pub anomalies_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            dir: PathBuf::from("."),
            lpr_file: "out.csv".to_string(),
            over_capacity_file: "review_too_much_cars.csv".to_string(),
            new_households_file: "review_new_families.csv".to_string(),
            anomalies_file: "anomalies.csv".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn lpr_path(&self) -> PathBuf {
        self.dir.join(&self.lpr_file)
    }

    pub fn over_capacity_path(&self) -> PathBuf {
        self.dir.join(&self.over_capacity_file)
    }

    pub fn new_households_path(&self) -> PathBuf {
        self.dir.join(&self.new_households_file)
    }

    pub fn anomalies_path(&self) -> PathBuf {
        self.dir.join(&self.anomalies_file)
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub survey: SurveyVocabulary,
    pub source: SourceConfig,
    pub reports: ReportConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load from a TOML file. Missing sections fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }

    /// Defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.reports.max_cars_per_household, 2);
        assert_eq!(
            config.reports.new_household_cutoff,
            NaiveDate::from_ymd_opt(2022, 5, 1).unwrap()
        );
        assert_eq!(config.output.lpr_path(), PathBuf::from("./out.csv"));
        assert_eq!(config.survey.yes, "כן");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [survey]
            yes = "Yes"

            [reports]
            max_cars_per_household = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.survey.yes, "Yes");
        assert_eq!(config.survey.not_registered, "לא/לא יודע");
        assert_eq!(config.reports.max_cars_per_household, 3);
        assert_eq!(config.source.timestamp_format, "%d/%m/%Y %H:%M:%S");
    }

    #[test]
    fn test_cutoff_parses_as_date() {
        let config = AppConfig::from_toml("[reports]\nnew_household_cutoff = \"2023-01-15\"\n").unwrap();
        assert_eq!(
            config.reports.new_household_cutoff,
            NaiveDate::from_ymd_opt(2023, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_bad_toml_is_error() {
        assert!(AppConfig::from_toml("[reports]\nmax_cars_per_household = \"many\"").is_err());
    }

    #[test]
    fn test_load_without_path() {
        assert_eq!(AppConfig::load(None).unwrap(), AppConfig::default());
    }
}
