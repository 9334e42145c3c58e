use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::extract::extract_json_object;
use super::schema::EvidenceSchema;
use super::types::{AssetType, Summary};

pub const MAX_SENTENCES: usize = 4;
pub const MAX_FINDINGS: usize = 5;
pub const MAX_RECOMMENDATIONS: usize = 4;
const MIN_SUMMARY_CHARS: usize = 10;

/// Outcome of one self-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub valid: bool,
    pub problems: Vec<String>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            valid: true,
            problems: Vec::new(),
        }
    }

    pub fn fail(problem: impl Into<String>) -> Self {
        Self {
            valid: false,
            problems: vec![problem.into()],
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    valid: bool,
    #[serde(default)]
    problems: Vec<String>,
}

/// Deterministic checks that need no backend call.
pub fn local_checks(draft: &Summary, asset_type: AssetType, now: DateTime<Utc>) -> Vec<String> {
    let mut problems = Vec::new();

    let text = draft.summary.trim();
    if text.chars().count() < MIN_SUMMARY_CHARS {
        problems.push("Summary text too short".to_string());
    }
    let sentences = count_sentences(text);
    if sentences > MAX_SENTENCES {
        problems.push(format!(
            "Summary has {sentences} sentences, at most {MAX_SENTENCES} allowed"
        ));
    }

    if draft.findings.is_empty() {
        problems.push("At least one finding required".to_string());
    } else if draft.findings.len() > MAX_FINDINGS {
        problems.push(format!(
            "{} findings listed, at most {MAX_FINDINGS} allowed",
            draft.findings.len()
        ));
    }

    if draft.recommendations.is_empty() {
        problems.push("At least one recommendation required".to_string());
    } else if draft.recommendations.len() > MAX_RECOMMENDATIONS {
        problems.push(format!(
            "{} recommendations listed, at most {MAX_RECOMMENDATIONS} allowed",
            draft.recommendations.len()
        ));
    }

    if draft.data_coverage.fields_present_pct > 100 {
        problems.push(format!(
            "data_coverage.fields_present_pct is {}, must be within 0-100",
            draft.data_coverage.fields_present_pct
        ));
    }

    problems.extend(EvidenceSchema::for_asset(asset_type).check(&draft.evidence, now));
    problems
}

/// Sentence terminators followed by whitespace or end of text. Decimal points
/// and version numbers ("TLS 1.2") do not split.
pub fn count_sentences(text: &str) -> usize {
    let mut count = 0;
    let mut in_sentence = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().is_none_or(|next| next.is_whitespace());
            if at_boundary && in_sentence {
                count += 1;
                in_sentence = false;
            }
        } else if !c.is_whitespace() {
            in_sentence = true;
        }
    }
    if in_sentence {
        count += 1;
    }
    count
}

/// Interpret the validator's reply. Structured verdicts are taken as-is;
/// anything else goes through [`heuristic_verdict`].
pub fn parse_verdict(text: &str) -> Verdict {
    let structured = extract_json_object(text)
        .and_then(|map| serde_json::from_value::<RawVerdict>(Value::Object(map)).ok());
    match structured {
        Some(raw) if raw.valid => Verdict {
            valid: true,
            problems: Vec::new(),
        },
        Some(raw) if raw.problems.is_empty() => {
            Verdict::fail("validator rejected the summary without listing problems")
        }
        Some(raw) => Verdict {
            valid: false,
            problems: raw.problems,
        },
        None => heuristic_verdict(text),
    }
}

const NEGATIVE_MARKERS: &[&str] = &[
    "invalid",
    "not valid",
    "fail",
    "problem",
    "violation",
    "error",
];
const POSITIVE_MARKERS: &[&str] = &["valid", "pass", "approved"];

/// Conservative reading of an unstructured reply: pass only when it says so
/// and mentions nothing negative.
pub fn heuristic_verdict(text: &str) -> Verdict {
    let lower = text.to_lowercase();
    let negative = NEGATIVE_MARKERS.iter().any(|m| lower.contains(m));
    let positive = POSITIVE_MARKERS.iter().any(|m| lower.contains(m));
    if positive && !negative {
        return Verdict::pass();
    }
    let excerpt: String = text.trim().chars().take(300).collect();
    if excerpt.is_empty() {
        Verdict::fail("validator returned an empty response")
    } else {
        Verdict::fail(format!("validator response was not structured: {excerpt}"))
    }
}
