use std::fmt;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::extract::extract_json_object;
use super::prompt;
use super::types::{Summary, SummaryRequest};
use super::validate::{self, Verdict};
use crate::anthropic::{Message, MessageSender, MessagesRequest};
use crate::error::WorkflowError;
use crate::persistence::SummaryStore;

/// The four steps of the summary workflow.
///
/// START → GENERATE → VALIDATE → { GENERATE | END }
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Start,
    Generate,
    Validate,
    End,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Start => write!(f, "START"),
            Step::Generate => write!(f, "GENERATE"),
            Step::Validate => write!(f, "VALIDATE"),
            Step::End => write!(f, "END"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Model identifier sent to the reasoning backend.
    pub model: String,
    pub max_tokens: u32,
    /// Generation attempts before giving up. Values below 1 are treated as 1.
    pub max_attempts: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            model: "claude-haiku-4-5-20251001".to_string(),
            max_tokens: 2048,
            max_attempts: 2,
        }
    }
}

/// State carried through one workflow run and discarded afterwards.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub request: SummaryRequest,
    /// Latest successfully parsed draft, kept across failed attempts.
    pub draft: Option<Summary>,
    /// Whether `draft` came from the most recent GENERATE.
    pub draft_is_fresh: bool,
    pub feedback: Option<String>,
    pub attempt_count: u32,
    pub is_valid: bool,
    pub history: Vec<Step>,
}

impl WorkflowState {
    pub fn new(request: SummaryRequest) -> Self {
        Self {
            request,
            draft: None,
            draft_is_fresh: false,
            feedback: None,
            attempt_count: 0,
            is_valid: false,
            history: Vec::new(),
        }
    }

    /// Where VALIDATE goes next.
    pub fn route(&self, max_attempts: u32) -> Step {
        if self.is_valid || self.attempt_count >= max_attempts {
            Step::End
        } else {
            Step::Generate
        }
    }
}

/// What a finished run produced. Only returned once the summary is persisted.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub asset_id: String,
    pub attempts: u32,
    pub is_valid: bool,
    pub summary: Summary,
    /// Problems from the final validation, when the persisted draft is invalid.
    pub feedback: Option<String>,
    pub history: Vec<Step>,
}

/// Generate / validate / retry loop for one asset summary.
pub struct SummaryWorkflow<S, P> {
    backend: S,
    store: P,
    config: WorkflowConfig,
}

impl<S: MessageSender, P: SummaryStore> SummaryWorkflow<S, P> {
    pub fn new(backend: S, store: P, config: WorkflowConfig) -> Self {
        Self {
            backend,
            store,
            config,
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Drive the state machine to END and persist the best draft.
    ///
    /// Backend and parse failures only cost an attempt. The run fails only if
    /// no draft was ever produced, or if persisting it fails.
    pub async fn run(&self, request: SummaryRequest) -> Result<WorkflowReport, WorkflowError> {
        let mut state = WorkflowState::new(request);
        let mut step = Step::Start;
        loop {
            state.history.push(step);
            debug!(
                asset_id = %state.request.asset_id,
                %step,
                attempt = state.attempt_count,
                "workflow step"
            );
            step = match step {
                Step::Start => {
                    state.attempt_count = 0;
                    state.is_valid = false;
                    Step::Generate
                }
                Step::Generate => {
                    self.generate(&mut state).await;
                    Step::Validate
                }
                Step::Validate => {
                    self.validate(&mut state).await;
                    state.route(self.max_attempts())
                }
                Step::End => return self.finish(state).await,
            };
        }
    }

    async fn generate(&self, state: &mut WorkflowState) {
        let asset_id = state.request.asset_id.clone();
        info!(asset_id = %asset_id, attempt = state.attempt_count + 1, "generating summary draft");

        let req = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: Some(prompt::summary_prompt(
                state.request.asset_type,
                state.feedback.as_deref(),
                Utc::now(),
            )),
            messages: vec![Message::user(prompt::asset_message(&state.request.asset))],
        };

        let outcome = match self.backend.send_message(&req).await {
            Ok(response) => parse_draft(&response.text(), &asset_id),
            Err(e) => Err(format!("reasoning backend error: {e}")),
        };

        match outcome {
            Ok(draft) => {
                state.draft = Some(draft);
                state.draft_is_fresh = true;
            }
            Err(problem) => {
                warn!(asset_id = %asset_id, %problem, "summary generation attempt failed");
                state.draft_is_fresh = false;
                state.feedback = Some(problem);
            }
        }
        state.attempt_count += 1;
    }

    async fn validate(&self, state: &mut WorkflowState) {
        let draft = match &state.draft {
            Some(draft) if state.draft_is_fresh => draft,
            _ => {
                state.is_valid = false;
                if state.feedback.is_none() {
                    state.feedback = Some("no summary draft was produced".to_string());
                }
                return;
            }
        };

        let now = Utc::now();
        let mut problems = validate::local_checks(draft, state.request.asset_type, now);
        let verdict = self.self_check(&state.request, draft, now).await;
        for problem in verdict.problems {
            if !problems.contains(&problem) {
                problems.push(problem);
            }
        }

        state.is_valid = verdict.valid && problems.is_empty();
        info!(
            asset_id = %state.request.asset_id,
            attempt = state.attempt_count,
            valid = state.is_valid,
            problems = problems.len(),
            "summary draft validated"
        );
        state.feedback = if state.is_valid {
            None
        } else {
            Some(problems.join("\n"))
        };
    }

    /// Ask the backend for an independent review of the draft.
    async fn self_check(
        &self,
        request: &SummaryRequest,
        draft: &Summary,
        now: chrono::DateTime<Utc>,
    ) -> Verdict {
        let req = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: Some(prompt::validator_prompt(request.asset_type, now)),
            messages: vec![Message::user(prompt::review_message(&request.asset, draft))],
        };
        match self.backend.send_message(&req).await {
            Ok(response) => validate::parse_verdict(&response.text()),
            Err(e) => Verdict::fail(format!("validator unavailable: {e}")),
        }
    }

    async fn finish(&self, state: WorkflowState) -> Result<WorkflowReport, WorkflowError> {
        let WorkflowState {
            request,
            draft,
            feedback,
            attempt_count,
            is_valid,
            history,
            ..
        } = state;

        let Some(summary) = draft else {
            return Err(WorkflowError::Exhausted {
                attempts: attempt_count,
                last_feedback: feedback.unwrap_or_default(),
            });
        };

        if is_valid {
            info!(
                asset_id = %request.asset_id,
                attempts = attempt_count,
                severity = %summary.severity,
                "summary accepted"
            );
        } else {
            warn!(
                asset_id = %request.asset_id,
                attempts = attempt_count,
                feedback = feedback.as_deref().unwrap_or_default(),
                "persisting summary that failed validation"
            );
        }

        self.store.upsert(request.asset_type, &summary).await?;

        Ok(WorkflowReport {
            asset_id: request.asset_id,
            attempts: attempt_count,
            is_valid,
            summary,
            feedback: if is_valid { None } else { feedback },
            history,
        })
    }
}

/// Turn model output into a draft, stamping it with the asset id.
fn parse_draft(text: &str, asset_id: &str) -> Result<Summary, String> {
    let mut object = extract_json_object(text)
        .ok_or_else(|| "response did not contain a JSON object".to_string())?;
    object.insert("id".to_string(), Value::String(asset_id.to_string()));
    serde_json::from_value(Value::Object(object))
        .map_err(|e| format!("summary JSON did not match the expected format: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anthropic::{AnthropicError, ContentBlock, MessagesResponse, Usage};
    use crate::persistence::InMemorySummaryStore;
    use crate::summary::{AssetType, Severity};
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies to generation and review requests from two separate scripts.
    /// The last entry of a script repeats once it runs out.
    struct ScriptedBackend {
        drafts: Vec<Result<String, u16>>,
        verdicts: Vec<String>,
        generate_prompts: Mutex<Vec<String>>,
        review_calls: Mutex<usize>,
    }

    impl ScriptedBackend {
        fn new(drafts: Vec<Result<String, u16>>, verdicts: Vec<&str>) -> Self {
            Self {
                drafts,
                verdicts: verdicts.into_iter().map(String::from).collect(),
                generate_prompts: Mutex::new(Vec::new()),
                review_calls: Mutex::new(0),
            }
        }

        fn generate_calls(&self) -> usize {
            self.generate_prompts.lock().unwrap().len()
        }
    }

    fn reply(text: &str) -> MessagesResponse {
        MessagesResponse {
            id: "mock".into(),
            content: vec![ContentBlock {
                content_type: "text".into(),
                text: text.to_string(),
            }],
            model: "mock".into(),
            stop_reason: Some("end_turn".into()),
            usage: Usage::default(),
        }
    }

    impl MessageSender for ScriptedBackend {
        async fn send_message(
            &self,
            req: &MessagesRequest,
        ) -> Result<MessagesResponse, AnthropicError> {
            let system = req.system.clone().unwrap_or_default();
            if system.starts_with(prompt::VALIDATOR_HEADER) {
                let mut calls = self.review_calls.lock().unwrap();
                let text = &self.verdicts[(*calls).min(self.verdicts.len() - 1)];
                *calls += 1;
                return Ok(reply(text));
            }
            let mut prompts = self.generate_prompts.lock().unwrap();
            let next = &self.drafts[prompts.len().min(self.drafts.len() - 1)];
            prompts.push(system);
            match next {
                Ok(text) => Ok(reply(text)),
                Err(status) => Err(AnthropicError::ApiError {
                    status: *status,
                    message: "mock error".into(),
                }),
            }
        }
    }

    const PASS: &str = r#"{"valid": true, "problems": []}"#;

    fn asset() -> Value {
        json!({
            "id": "test.example.com",
            "domains": ["test.example.com", "www.test.example.com"],
            "key_info": {"algorithm": "RSA", "size": 2048}
        })
    }

    fn request() -> SummaryRequest {
        SummaryRequest::new("test.example.com", AssetType::Web, asset())
    }

    fn good_draft() -> String {
        let not_after = (Utc::now() + chrono::Duration::days(45)).to_rfc3339();
        format!(
            "Here you go:\n```json\n{}\n```",
            json!({
                "summary": "Certificate for test.example.com expires in 45 days. Key strength is adequate.",
                "severity": "high",
                "evidence": {
                    "common_name": "test.example.com",
                    "issuer": "Test CA",
                    "not_after": not_after,
                    "days_to_expiry": 45,
                    "key_algorithm": "RSA",
                    "key_size": 2048,
                    "signature_algorithm": "sha256WithRSAEncryption",
                    "sans": ["test.example.com", "www.test.example.com"],
                    "san_count": 2,
                    "self_signed": false
                },
                "findings": ["Certificate expires within 60 days"],
                "recommendations": ["Renew the certificate"],
                "assumptions": [],
                "data_coverage": {"fields_present_pct": 90, "missing_fields": ["security_headers"]}
            })
        )
    }

    /// Parses fine but breaks the list-size rule every time.
    fn oversized_draft() -> String {
        let mut value: Value = serde_json::from_str(
            good_draft()
                .trim_start_matches("Here you go:\n```json\n")
                .trim_end_matches("\n```"),
        )
        .unwrap();
        value["findings"] = json!(["a", "b", "c", "d", "e", "f", "g"]);
        value.to_string()
    }

    fn workflow(
        backend: ScriptedBackend,
    ) -> SummaryWorkflow<ScriptedBackend, InMemorySummaryStore> {
        SummaryWorkflow::new(backend, InMemorySummaryStore::new(), WorkflowConfig::default())
    }

    #[tokio::test]
    async fn valid_draft_ends_after_one_attempt() {
        let wf = workflow(ScriptedBackend::new(vec![Ok(good_draft())], vec![PASS]));

        let report = wf.run(request()).await.unwrap();

        assert!(report.is_valid);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.summary.id, "test.example.com");
        assert_eq!(report.summary.severity, Severity::High);
        assert_eq!(
            report.history,
            vec![Step::Start, Step::Generate, Step::Validate, Step::End]
        );
        assert_eq!(wf.backend().generate_calls(), 1);
        assert!(wf.store().get(AssetType::Web, "test.example.com").is_some());
    }

    #[tokio::test]
    async fn unparsable_output_exhausts_without_persisting() {
        let wf = workflow(ScriptedBackend::new(
            vec![Ok("I am unable to produce JSON today.".into())],
            vec![PASS],
        ));

        let err = wf.run(request()).await.unwrap_err();

        match err {
            WorkflowError::Exhausted {
                attempts,
                last_feedback,
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_feedback, "response did not contain a JSON object");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(wf.backend().generate_calls(), 2);
        assert_eq!(*wf.backend().review_calls.lock().unwrap(), 0);
        assert!(wf.store().is_empty());
    }

    #[tokio::test]
    async fn rule_violating_draft_is_still_persisted() {
        let wf = workflow(ScriptedBackend::new(vec![Ok(oversized_draft())], vec![PASS]));

        let report = wf.run(request()).await.unwrap();

        assert!(!report.is_valid);
        assert_eq!(report.attempts, 2);
        assert!(report.feedback.unwrap().contains("7 findings listed"));
        let stored = wf.store().get(AssetType::Web, "test.example.com").unwrap();
        assert_eq!(stored.findings.len(), 7);
    }

    #[tokio::test]
    async fn retry_carries_feedback_and_can_succeed() {
        let wf = workflow(ScriptedBackend::new(
            vec![Ok(good_draft())],
            vec![
                r#"{"valid": false, "problems": ["san_count disagrees with sans"]}"#,
                PASS,
            ],
        ));

        let report = wf.run(request()).await.unwrap();

        assert!(report.is_valid);
        assert_eq!(report.attempts, 2);
        let prompts = wf.backend().generate_prompts.lock().unwrap();
        assert!(!prompts[0].contains("PREVIOUS VALIDATION FEEDBACK"));
        assert!(
            prompts[1].ends_with("PREVIOUS VALIDATION FEEDBACK:\nsan_count disagrees with sans")
        );
    }

    #[tokio::test]
    async fn backend_error_consumes_an_attempt() {
        let wf = workflow(ScriptedBackend::new(
            vec![Err(529), Ok(good_draft())],
            vec![PASS],
        ));

        let report = wf.run(request()).await.unwrap();

        assert!(report.is_valid);
        assert_eq!(report.attempts, 2);
        let prompts = wf.backend().generate_prompts.lock().unwrap();
        assert!(prompts[1].contains("reasoning backend error: API error (status 529)"));
    }

    #[tokio::test]
    async fn earlier_draft_survives_a_failed_final_attempt() {
        let wf = workflow(ScriptedBackend::new(
            vec![Ok(good_draft()), Ok("garbage".into())],
            vec![r#"{"valid": false, "problems": ["tone is off"]}"#],
        ));

        let report = wf.run(request()).await.unwrap();

        assert!(!report.is_valid);
        assert_eq!(report.attempts, 2);
        assert_eq!(report.summary.severity, Severity::High);
        assert_eq!(
            report.feedback.as_deref(),
            Some("response did not contain a JSON object")
        );
    }

    #[tokio::test]
    async fn unstructured_rejection_uses_heuristic() {
        let wf = workflow(ScriptedBackend::new(
            vec![Ok(good_draft())],
            vec!["The summary fails check 2.", PASS],
        ));

        let report = wf.run(request()).await.unwrap();
        assert!(report.is_valid);
        assert_eq!(report.attempts, 2);
    }

    #[tokio::test]
    async fn single_attempt_budget() {
        let config = WorkflowConfig {
            max_attempts: 0,
            ..WorkflowConfig::default()
        };
        let wf = SummaryWorkflow::new(
            ScriptedBackend::new(vec![Ok(oversized_draft())], vec![PASS]),
            InMemorySummaryStore::new(),
            config,
        );

        let report = wf.run(request()).await.unwrap();
        assert_eq!(report.attempts, 1);
        assert!(!report.is_valid);
    }

    #[test]
    fn route_ends_on_valid_or_exhausted() {
        let mut state = WorkflowState::new(request());
        state.attempt_count = 1;
        assert_eq!(state.route(2), Step::Generate);

        state.is_valid = true;
        assert_eq!(state.route(2), Step::End);

        state.is_valid = false;
        state.attempt_count = 2;
        assert_eq!(state.route(2), Step::End);
    }

    #[test]
    fn parse_draft_injects_asset_id() {
        let text = r#"{"id": "wrong", "summary": "Fine overall.", "severity": "low"}"#;
        let draft = parse_draft(text, "right.example.com").unwrap();
        assert_eq!(draft.id, "right.example.com");

        let err = parse_draft(r#"{"summary": "x"}"#, "a").unwrap_err();
        assert!(err.starts_with("summary JSON did not match the expected format"));
    }

    #[test]
    fn step_display() {
        assert_eq!(Step::Start.to_string(), "START");
        assert_eq!(Step::Generate.to_string(), "GENERATE");
        assert_eq!(Step::Validate.to_string(), "VALIDATE");
        assert_eq!(Step::End.to_string(), "END");
    }
}
