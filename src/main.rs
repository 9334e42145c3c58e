use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info, warn};

use assetwatch::anthropic::AnthropicClient;
use assetwatch::cli::{Cli, Command};
use assetwatch::config::AppConfig;
use assetwatch::logging;
use assetwatch::persistence::JsonFileSummaryStore;
use assetwatch::scheduler::{ASSET_SUMMARY, Job, JobPayload, JobStatus, Scheduler};
use assetwatch::summary::{AssetType, SummaryJobHandler, SummaryRequest, SummaryWorkflow};
use assetwatch::ui::BatchProgress;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(concurrency) = cli.concurrency {
        config.scheduler.concurrency = concurrency;
    }

    match cli.command {
        Command::Config => {
            let shown = AppConfig {
                api_key: config.masked_api_key(),
                ..config
            };
            print!("{}", toml::to_string_pretty(&shown)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Summarize {
            files,
            asset_type,
            out_dir,
        } => summarize(config, &files, asset_type.into(), out_dir).await,
    }
}

async fn summarize(
    config: AppConfig,
    files: &[PathBuf],
    asset_type: AssetType,
    out_dir: Option<PathBuf>,
) -> Result<ExitCode> {
    if config.api_key.is_empty() {
        bail!("no API key configured: set ANTHROPIC_API_KEY or api_key in assetwatch.toml");
    }

    let requests = files
        .iter()
        .map(|path| load_request(path, asset_type))
        .collect::<Result<Vec<_>>>()?;

    let client = AnthropicClient::new(config.api_key.clone(), config.request_timeout())?;
    let store = JsonFileSummaryStore::new(out_dir.unwrap_or_else(|| config.output_dir.clone()));
    let workflow = SummaryWorkflow::new(client, store.clone(), config.workflow_config());

    let scheduler = Scheduler::new(config.scheduler_config());
    scheduler.register_handler(ASSET_SUMMARY, Arc::new(SummaryJobHandler::new(workflow)));
    debug!(
        handlers = ?scheduler.registered_types(),
        concurrency = scheduler.config().concurrency,
        rate_limit = scheduler.config().rate_limit,
        "scheduler ready"
    );

    let mut progress = BatchProgress::new();
    let mut job_ids = Vec::with_capacity(requests.len());
    for request in requests {
        if let Some(active) = scheduler.active_job_for_asset(&request.asset_id, ASSET_SUMMARY) {
            warn!(
                asset_id = %request.asset_id,
                job_id = %active.id,
                "asset already queued, skipping duplicate"
            );
            continue;
        }
        let label = request.asset_id.clone();
        let job_id = scheduler.submit(JobPayload::AssetSummary(request))?;
        progress.track(&job_id, &label);
        job_ids.push(job_id);
    }
    info!(jobs = job_ids.len(), dir = %store.root().display(), "summaries queued");

    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    let jobs = loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, cancelling queued jobs");
                scheduler.shutdown().await;
            }
        }
        let jobs: Vec<Job> = job_ids
            .iter()
            .filter_map(|id| scheduler.get_job(id))
            .collect();
        for job in &jobs {
            progress.update(job);
        }
        if jobs.iter().all(|job| job.status.is_terminal()) {
            break jobs;
        }
    };

    let stats = scheduler.stats();
    scheduler.shutdown().await;
    progress.print_summary(&jobs, &stats);

    let all_ok = jobs.iter().all(|job| job.status == JobStatus::Completed);
    Ok(if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_request(path: &Path, asset_type: AssetType) -> Result<SummaryRequest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read asset file {}", path.display()))?;
    let asset: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("asset file {} is not valid JSON", path.display()))?;
    SummaryRequest::from_asset(asset_type, asset)
        .with_context(|| format!("asset file {} has no string \"id\" field", path.display()))
}
