use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};

/// Which kind of asset a summary describes. Each kind has its own evidence
/// schema and scoring rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Web,
    Host,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Web => "web",
            AssetType::Host => "host",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal risk level assigned by the reasoning backend. Parsing ignores case
/// and surrounding whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!(
                "unknown severity \"{raw}\", expected low, medium, high or critical"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// How much of the expected asset data was available to the analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCoverage {
    /// Whole percent. Fractional values are rounded on input.
    #[serde(default, deserialize_with = "whole_percent")]
    pub fields_present_pct: u32,
    #[serde(default)]
    pub missing_fields: Vec<String>,
}

fn whole_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value < 0.0 {
        return Err(de::Error::custom(format!(
            "fields_present_pct must be a non-negative number, got {value}"
        )));
    }
    Ok(value.round().min(f64::from(u32::MAX)) as u32)
}

/// A finished risk summary for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    pub summary: String,
    pub severity: Severity,
    /// Keys are constrained per asset type, see [`crate::summary::schema`].
    #[serde(default)]
    pub evidence: Map<String, Value>,
    #[serde(default)]
    pub evidence_extras: String,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub data_coverage: DataCoverage,
}

/// Payload of an `asset-summary` job: the asset as read from the asset
/// repository, plus its discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub asset_id: String,
    pub asset_type: AssetType,
    pub asset: Value,
}

impl SummaryRequest {
    pub fn new(asset_id: impl Into<String>, asset_type: AssetType, asset: Value) -> Self {
        Self {
            asset_id: asset_id.into(),
            asset_type,
            asset,
        }
    }

    /// Build a request from an asset document, taking the id from its `id` field.
    pub fn from_asset(asset_type: AssetType, asset: Value) -> Option<Self> {
        let id = asset.get("id")?.as_str()?.to_string();
        Some(Self::new(id, asset_type, asset))
    }
}
