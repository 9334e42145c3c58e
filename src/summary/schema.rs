//! Evidence schemas for each asset type.
//!
//! The reasoning backend fills a free-form `evidence` object; these tables pin
//! down which keys it may use, which it must use, and which numeric fields are
//! derived from other fields and must agree with them.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use super::types::AssetType;

/// How a derived numeric field is computed from its source field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// Whole days from now until the timestamp in the source field.
    DaysUntil,
    /// Number of elements in the source array.
    CountOf,
}

#[derive(Debug, Clone, Copy)]
pub struct DerivedField {
    pub key: &'static str,
    pub source: &'static str,
    pub derivation: Derivation,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct EvidenceSchema {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    pub derived: &'static [DerivedField],
}

const WEB: EvidenceSchema = EvidenceSchema {
    required: &[
        "common_name",
        "issuer",
        "not_after",
        "days_to_expiry",
        "key_algorithm",
        "key_size",
        "signature_algorithm",
        "san_count",
        "self_signed",
    ],
    optional: &[
        "not_before",
        "sans",
        "wildcard",
        "https_redirect",
        "security_headers",
        "organization",
    ],
    derived: &[
        DerivedField {
            key: "days_to_expiry",
            source: "not_after",
            derivation: Derivation::DaysUntil,
            tolerance: 1.0,
        },
        DerivedField {
            key: "san_count",
            source: "sans",
            derivation: Derivation::CountOf,
            tolerance: 0.0,
        },
    ],
};

const HOST: EvidenceSchema = EvidenceSchema {
    required: &["ip", "open_ports", "open_port_count", "services"],
    optional: &[
        "hostname",
        "os",
        "tls_versions",
        "ssh_password_auth",
        "cert_not_after",
        "days_to_expiry",
    ],
    derived: &[
        DerivedField {
            key: "open_port_count",
            source: "open_ports",
            derivation: Derivation::CountOf,
            tolerance: 0.0,
        },
        DerivedField {
            key: "days_to_expiry",
            source: "cert_not_after",
            derivation: Derivation::DaysUntil,
            tolerance: 1.0,
        },
    ],
};

impl EvidenceSchema {
    pub fn for_asset(asset_type: AssetType) -> &'static EvidenceSchema {
        match asset_type {
            AssetType::Web => &WEB,
            AssetType::Host => &HOST,
        }
    }

    pub fn allows(&self, key: &str) -> bool {
        self.required.contains(&key) || self.optional.contains(&key)
    }

    /// Human-readable description used in the instruction templates.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "required keys: {}\noptional keys: {}",
            self.required.join(", "),
            self.optional.join(", ")
        );
        for field in self.derived {
            let rule = match field.derivation {
                Derivation::DaysUntil => format!("whole days from now until {}", field.source),
                Derivation::CountOf => format!("number of entries in {}", field.source),
            };
            out.push_str(&format!("\n{} = {}", field.key, rule));
        }
        out
    }

    /// Every schema violation in `evidence`, evaluated against `now`.
    pub fn check(&self, evidence: &Map<String, Value>, now: DateTime<Utc>) -> Vec<String> {
        let mut problems = Vec::new();

        let mut unknown: Vec<&str> = evidence
            .keys()
            .map(String::as_str)
            .filter(|key| !self.allows(key))
            .collect();
        unknown.sort_unstable();
        for key in unknown {
            problems.push(format!("evidence key \"{key}\" is not part of the schema"));
        }

        for key in self.required {
            if !evidence.contains_key(*key) {
                problems.push(format!("evidence is missing required key \"{key}\""));
            }
        }

        for field in self.derived {
            if let Some(problem) = check_derived(field, evidence, now) {
                problems.push(problem);
            }
        }

        problems
    }
}

fn check_derived(
    field: &DerivedField,
    evidence: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Option<String> {
    let actual = evidence.get(field.key)?;
    // Null means "unknown" and is reported through data coverage instead.
    if actual.is_null() {
        return None;
    }
    let Some(actual) = actual.as_f64() else {
        return Some(format!("evidence \"{}\" must be a number", field.key));
    };
    let expected = match field.derivation {
        Derivation::DaysUntil => {
            let source = evidence.get(field.source)?.as_str()?;
            let deadline = parse_timestamp(source)?;
            (deadline - now).num_seconds() as f64 / 86_400.0
        }
        Derivation::CountOf => evidence.get(field.source)?.as_array()?.len() as f64,
    };

    if (actual - expected).abs() > field.tolerance + f64::EPSILON {
        Some(format!(
            "evidence \"{}\" is {} but {} implies {:.0}",
            field.key, actual, field.source, expected
        ))
    } else {
        None
    }
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}
