//! Configuração do assetwatch carregada a partir de `assetwatch.toml`.
//!
//! A struct [`AppConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `ANTHROPIC_API_KEY` tem precedência sobre o arquivo.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::{RetentionPolicy, SchedulerConfig};
use crate::summary::WorkflowConfig;

/// Nome do arquivo procurado no diretório atual quando `--config` não é usado.
pub const DEFAULT_CONFIG_FILE: &str = "assetwatch.toml";

/// Configuração de nível superior carregada de `assetwatch.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chave da API Anthropic.
    #[serde(default)]
    pub api_key: String,

    /// Modelo usado tanto na geração quanto na validação.
    #[serde(default = "default_model")]
    pub model: String,

    /// Timeout total de cada requisição ao backend, em segundos.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Diretório onde os resumos são gravados.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub workflow: WorkflowSection,
}

/// Seção `[scheduler]`. Zero em `rate_limit`, `max_finished_jobs` ou
/// `max_job_age_secs` desativa o respectivo limite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub concurrency: usize,
    pub rate_limit: usize,
    pub rate_window_ms: u64,
    pub job_timeout_secs: u64,
    pub max_finished_jobs: usize,
    pub max_job_age_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            concurrency: 3,
            rate_limit: 5,
            rate_window_ms: 1000,
            job_timeout_secs: 300,
            max_finished_jobs: 1000,
            max_job_age_secs: 24 * 60 * 60,
        }
    }
}

/// Seção `[workflow]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    pub max_attempts: u32,
    pub max_tokens: u32,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            max_tokens: 2048,
        }
    }
}

// Valor padrão para o modelo: Haiku 4.5.
fn default_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

// Valor padrão para o timeout de requisição: 120s.
fn default_request_timeout_secs() -> u64 {
    120
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("summaries")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            output_dir: default_output_dir(),
            scheduler: SchedulerSection::default(),
            workflow: WorkflowSection::default(),
        }
    }
}

impl AppConfig {
    /// Carrega a configuração de `path`, ou de `assetwatch.toml` no diretório
    /// atual. Um caminho explícito precisa existir; o arquivo padrão é opcional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        // Variável de ambiente tem precedência sobre o arquivo para a chave API.
        config.apply_api_key_override(std::env::var("ANTHROPIC_API_KEY").ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    fn apply_api_key_override(&mut self, key: Option<String>) {
        if let Some(key) = key
            && !key.is_empty()
        {
            self.api_key = key;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let s = &self.scheduler;
        SchedulerConfig {
            concurrency: s.concurrency,
            rate_limit: s.rate_limit,
            rate_window: Duration::from_millis(s.rate_window_ms),
            job_timeout: Duration::from_secs(s.job_timeout_secs),
            retention: RetentionPolicy {
                max_finished: (s.max_finished_jobs > 0).then_some(s.max_finished_jobs),
                max_age: (s.max_job_age_secs > 0).then(|| Duration::from_secs(s.max_job_age_secs)),
            },
        }
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            model: self.model.clone(),
            max_tokens: self.workflow.max_tokens,
            max_attempts: self.workflow.max_attempts,
        }
    }

    /// Chave da API com apenas os últimos quatro caracteres visíveis.
    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.is_empty() {
            return "(not set)".to_string();
        }
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{tail}", "*".repeat(chars.len() - 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.model, "claude-haiku-4-5-20251001");
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.output_dir, PathBuf::from("summaries"));
        assert_eq!(config.scheduler_config(), SchedulerConfig::default());
        assert_eq!(config.workflow_config(), WorkflowConfig::default());
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            api_key = "sk-test-123"

            [scheduler]
            concurrency = 8
            max_finished_jobs = 0

            [workflow]
            max_attempts = 4
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_key, "sk-test-123");
        assert_eq!(config.model, "claude-haiku-4-5-20251001");

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.concurrency, 8);
        assert_eq!(scheduler.rate_limit, 5);
        assert_eq!(scheduler.retention.max_finished, None);
        assert_eq!(
            scheduler.retention.max_age,
            Some(Duration::from_secs(86_400))
        );

        let workflow = config.workflow_config();
        assert_eq!(workflow.max_attempts, 4);
        assert_eq!(workflow.max_tokens, 2048);
    }

    #[test]
    fn load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = \"claude-sonnet-4-5\"\noutput_dir = \"/tmp/out\"").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.model, "claude-sonnet-4-5");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\nconcurrency = \"many\"").unwrap();
        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("invalid config file"));
    }

    #[test]
    fn env_key_overrides_file_unless_empty() {
        let mut config = AppConfig {
            api_key: "from-file".into(),
            ..AppConfig::default()
        };
        config.apply_api_key_override(Some(String::new()));
        assert_eq!(config.api_key, "from-file");
        config.apply_api_key_override(None);
        assert_eq!(config.api_key, "from-file");
        config.apply_api_key_override(Some("from-env".into()));
        assert_eq!(config.api_key, "from-env");
    }

    #[test]
    fn api_key_is_masked() {
        let mut config = AppConfig::default();
        assert_eq!(config.masked_api_key(), "(not set)");
        config.api_key = "short".into();
        assert_eq!(config.masked_api_key(), "*****");
        config.api_key = "sk-ant-abcdef1234".into();
        assert_eq!(config.masked_api_key(), "*************1234");
    }
}
