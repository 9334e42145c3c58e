//! Interface de terminal do assetwatch: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`BatchProgress`] acompanha visualmente os jobs
//! de um lote, um spinner por job.

use std::collections::HashMap;
use std::time::Duration;

use console::Style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::scheduler::{Job, JobStatus, SchedulerStats};

/// Spinners de um lote de jobs, indexados pelo id do job.
pub struct BatchProgress {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    // Estilo verde para jobs concluídos.
    green: Style,
    // Estilo vermelho para falhas.
    red: Style,
    // Estilo amarelo para jobs cancelados.
    yellow: Style,
    dim: Style,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Adiciona um spinner para o job, inicialmente na fila.
    pub fn track(&mut self, job_id: &str, label: &str) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {prefix:30!} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_prefix(label.to_string());
        pb.set_message(self.dim.apply_to("queued").to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        self.bars.insert(job_id.to_string(), pb);
    }

    /// Reflete o estado atual do job no seu spinner.
    pub fn update(&self, job: &Job) {
        let Some(pb) = self.bars.get(&job.id) else {
            return;
        };
        if pb.is_finished() {
            return;
        }
        let line = self.status_line(job);
        if job.status.is_terminal() {
            pb.finish_with_message(line);
        } else {
            pb.set_message(line);
        }
    }

    fn status_line(&self, job: &Job) -> String {
        match job.status {
            JobStatus::Pending => self.dim.apply_to("queued").to_string(),
            JobStatus::Processing => "summarizing...".to_string(),
            JobStatus::Completed => format!("{} done", self.green.apply_to("✓")),
            JobStatus::Failed => format!(
                "{} {}",
                self.red.apply_to("✗"),
                job.error.as_deref().unwrap_or("failed")
            ),
            JobStatus::Cancelled => format!("{} cancelled", self.yellow.apply_to("⊘")),
        }
    }

    /// Imprime a tabela final do lote e os contadores do scheduler.
    pub fn print_summary(&self, jobs: &[Job], stats: &SchedulerStats) {
        println!();
        println!("{}", self.dim.apply_to("─── Jobs ───"));
        for job in jobs {
            let status = match job.status {
                JobStatus::Completed => self.green.apply_to(job.status.to_string()),
                JobStatus::Failed => self.red.apply_to(job.status.to_string()),
                _ => self.yellow.apply_to(job.status.to_string()),
            };
            println!("{}  {status}", table_row(job));
        }
        println!(
            "{} completed, {} failed, {} cancelled",
            stats.completed_jobs, stats.failed_jobs, stats.cancelled_jobs
        );
    }
}

/// Colunas fixas de uma linha da tabela, sem a coluna de status colorida.
fn table_row(job: &Job) -> String {
    let asset = job.payload.asset_id().unwrap_or("-");
    let duration = job
        .duration_ms()
        .map(|ms| format!("{:.1}s", ms as f64 / 1000.0))
        .unwrap_or_else(|| "-".to_string());
    format!("{:<8} {:<32} {:>7}", &job.id[..job.id.len().min(8)], asset, duration)
}
