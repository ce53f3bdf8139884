//! Output formatting for the CLI.

use crate::config::{JobConfig, OutputFormat};
use crate::error::Result;
use crate::runner::JobReport;
use colored::*;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format configured jobs.
    pub fn format_jobs(&self, jobs: &[JobConfig]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(jobs)?),
            OutputFormat::Table => Ok(self.format_jobs_table(jobs)),
            OutputFormat::Quiet => Ok(jobs
                .iter()
                .map(|job| job.name.as_str())
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// Format configured jobs as a table.
    fn format_jobs_table(&self, jobs: &[JobConfig]) -> String {
        if jobs.is_empty() {
            return self.colorize("No jobs configured.", "yellow");
        }

        let mut builder = Builder::default();
        builder.push_record(["Job", "Type", "Safety", "Targets", "Storages", "Retention"]);

        for job in jobs {
            let targets: usize = job.sources.iter().map(|s| s.targets.len()).sum();
            let storages: Vec<&str> = job.storages.iter().map(|s| s.storage.as_str()).collect();
            let retention: Vec<String> = job
                .storages
                .iter()
                .map(|s| {
                    let r = &s.retention;
                    let mode = if r.use_count { "count" } else { "period" };
                    format!("{}d/{}w/{}m {}", r.days, r.weeks, r.months, mode)
                })
                .collect();

            builder.push_record([
                job.name.clone(),
                job.kind.to_string(),
                if job.safety_backup { "yes" } else { "no" }.to_string(),
                targets.to_string(),
                storages.join(", "),
                retention.join(", "),
            ]);
        }

        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));

        table.to_string()
    }

    /// Format the reports of a run.
    pub fn format_reports(&self, reports: &[JobReport]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(reports)?),
            OutputFormat::Table => Ok(self.format_reports_table(reports)),
            OutputFormat::Quiet => Ok(reports
                .iter()
                .filter(|report| !report.is_success())
                .map(|report| report.job.as_str())
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// Format the reports of a run as a table followed by their errors.
    fn format_reports_table(&self, reports: &[JobReport]) -> String {
        if reports.is_empty() {
            return self.colorize("No jobs run.", "yellow");
        }

        let mut builder = Builder::default();
        builder.push_record([
            "Job", "Status", "Artifacts", "Delivered", "Deleted", "Reinits", "Failures", "Time",
        ]);

        for report in reports {
            let status = if report.skipped {
                self.colorize("skipped", "cyan")
            } else if report.is_success() {
                self.colorize("ok", "green")
            } else {
                self.colorize("failed", "red")
            };
            let deleted: usize = report.deleted.values().sum();
            let failures: usize = report.failed.values().sum();

            builder.push_record([
                report.job.clone(),
                status,
                report.artifacts.to_string(),
                report.delivered.to_string(),
                deleted.to_string(),
                report.reinits.to_string(),
                failures.to_string(),
                format!("{}s", report.runtime_secs),
            ]);
        }

        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));

        let mut lines = vec![table.to_string()];
        for report in reports {
            for error in &report.errors {
                lines.push(self.error(&format!("{}: {}", report.job, error)));
            }
        }
        lines.join("\n")
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            "cyan" => text.cyan().to_string(),
            _ => text.to_string(),
        }
    }
}
