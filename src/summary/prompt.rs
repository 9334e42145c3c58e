//! Instruction templates for the reasoning backend.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::schema::EvidenceSchema;
use super::types::{AssetType, Summary};

const RUBRIC_PLACEHOLDER: &str = "<<<rubric>>>";
const SCHEMA_PLACEHOLDER: &str = "<<<schema>>>";
const NOW_PLACEHOLDER: &str = "<<<now>>>";

/// First line of the validator template, used to tell the two calls apart.
pub const VALIDATOR_HEADER: &str = "# REVIEW TASK";

const SUMMARY_TEMPLATE: &str = r#"# MISSION
You are a security analyst specializing in monitoring digital assets for risks and volatility.

Your task is to return a concise, evidence-based summary with a deterministic severity score.
No invented facts! Use only the provided asset data. The current time is <<<now>>>.

# SCORING BASIS (deterministic; highest rule wins)
<<<rubric>>>

# EVIDENCE SCHEMA
The "evidence" object may only use these keys:
<<<schema>>>

# CONSTRAINTS
- Use only ASSET_JSON data. Do not invent facts.
- Be brief and specific. No filler, no marketing tone.
- Unknown/absent fields -> list them under data_coverage.missing_fields
- Keep summary <=4 sentences; findings <=5 bullets; recommendations <=4 bullets

# OUTPUT
Respond with ONLY one JSON object:
{"summary": "...", "severity": "low|medium|high|critical", "evidence": {...},
 "evidence_extras": "...", "findings": ["..."], "recommendations": ["..."],
 "assumptions": ["..."], "data_coverage": {"fields_present_pct": 0-100, "missing_fields": ["..."]}}"#;

const WEB_RUBRIC: &str = "\
- critical: expired cert OR <=30 days to expiry OR self-signed on public web OR SHA-1/MD5 signature OR RSA<2048
- high: 31-60 days to expiry OR >100 SANs (likely shared/reused) OR CN/SAN mismatch with primary domain
- medium: 61-90 days to expiry OR wildcard cert with >=25 SANs OR missing HTTPS redirects/security headers
- low: none of the above issues detected";

const HOST_RUBRIC: &str = "\
- critical: expired or <=30 days to expiry on a served cert OR telnet/RDP/SMB exposed OR SHA-1/MD5 signature OR RSA<2048
- high: 31-60 days to expiry OR SSH with password authentication OR TLS 1.0/1.1 still offered
- medium: 61-90 days to expiry OR >=10 open ports OR unidentified services on open ports
- low: none of the above issues detected";

const VALIDATOR_TEMPLATE: &str = r#"# REVIEW TASK
You are a strict reviewer checking a security summary produced by another analyst.
The current time is <<<now>>>. Do not re-score severity; only check the rules below.

# CHECKLIST
1. Every key of "evidence" is in the schema, and every required key is present:
<<<schema>>>
2. Derived numeric fields agree with the values they are derived from (days within 1).
3. summary has at most 4 sentences, findings at most 5 items, recommendations at most 4 items.
4. Every claim is supported by ASSET_JSON.

# OUTPUT
Respond with ONLY one JSON object:
{"valid": true|false, "problems": ["one short sentence per problem"]}"#;

fn rubric(asset_type: AssetType) -> &'static str {
    match asset_type {
        AssetType::Web => WEB_RUBRIC,
        AssetType::Host => HOST_RUBRIC,
    }
}

/// System prompt for one generation attempt, with corrective feedback from the
/// previous attempt appended when there is any.
pub fn summary_prompt(asset_type: AssetType, feedback: Option<&str>, now: DateTime<Utc>) -> String {
    let mut prompt = SUMMARY_TEMPLATE
        .replace(RUBRIC_PLACEHOLDER, rubric(asset_type))
        .replace(SCHEMA_PLACEHOLDER, &EvidenceSchema::for_asset(asset_type).describe())
        .replace(NOW_PLACEHOLDER, &now.to_rfc3339());
    if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
        prompt.push_str("\n\nPREVIOUS VALIDATION FEEDBACK:\n");
        prompt.push_str(feedback);
    }
    prompt
}

pub fn validator_prompt(asset_type: AssetType, now: DateTime<Utc>) -> String {
    VALIDATOR_TEMPLATE
        .replace(SCHEMA_PLACEHOLDER, &EvidenceSchema::for_asset(asset_type).describe())
        .replace(NOW_PLACEHOLDER, &now.to_rfc3339())
}

pub fn asset_message(asset: &Value) -> String {
    let pretty = serde_json::to_string_pretty(asset).unwrap_or_else(|_| asset.to_string());
    format!("ASSET_JSON:\n{pretty}")
}

pub fn review_message(asset: &Value, draft: &Summary) -> String {
    let draft = serde_json::to_string_pretty(draft).unwrap_or_default();
    format!("{}\n\nSUMMARY_JSON:\n{draft}", asset_message(asset))
}
