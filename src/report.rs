//! Console and JSON reporting for pipeline stages
//!
//! Every stage reports through a [`StageProgress`] so per-file outcomes,
//! warnings and end-of-stage counts look the same whichever stage produced them.
//! The tables at the bottom are printed for `--report` and `lookup --all`.

use console::style;
use indicatif::ProgressBar;
use prettytable::{format, Cell, Row, Table};
use std::fmt::Display;
use std::path::Path;

use crate::json_output::JsonMessage;
use crate::mapping::FileRecord;
use crate::pipeline::PipelineReport;
use crate::stages::{FileFailure, Stage};
use crate::utils::{create_progress_bar, display_name, verbose_println, warn_println};

/// Where reporting goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Styled lines and progress bars
    Console,
    /// One JSON object per line on stdout
    Json,
    /// Nothing at all
    Silent,
}

/// Counts shown at the end of a stage
pub trait StageSummary {
    fn stage(&self) -> Stage;

    /// Named counts, the first one being the success count
    fn counts(&self) -> Vec<(&'static str, usize)>;

    fn failures(&self) -> &[FileFailure];
}

#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    mode: OutputMode,
    verbose: bool,
}

impl Reporter {
    pub fn new(mode: OutputMode, verbose: bool) -> Self {
        Self { mode, verbose }
    }

    pub fn silent() -> Self {
        Self::new(OutputMode::Silent, false)
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn is_console(&self) -> bool {
        self.mode == OutputMode::Console
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Begin reporting a stage over `total` files
    pub fn start_stage(&self, stage: Stage, total: usize) -> StageProgress<'_> {
        let bar = match self.mode {
            OutputMode::Console => {
                println!(
                    "{} {} ({} files)",
                    style("▶").bold().blue(),
                    style(stage_title(stage)).bold(),
                    total
                );
                let bar = create_progress_bar(total as u64);
                bar.set_message(stage.to_string());
                bar
            }
            OutputMode::Json => {
                JsonMessage::StageStarted { stage, total }.emit();
                ProgressBar::hidden()
            }
            OutputMode::Silent => ProgressBar::hidden(),
        };

        StageProgress {
            reporter: self,
            stage,
            bar,
            total,
            current: 0,
        }
    }
}

/// Reporting handle for one running stage
pub struct StageProgress<'a> {
    reporter: &'a Reporter,
    stage: Stage,
    bar: ProgressBar,
    total: usize,
    current: usize,
}

impl StageProgress<'_> {
    fn console<F: FnOnce()>(&self, print: F) {
        if self.reporter.is_console() {
            self.bar.suspend(print);
        }
    }

    fn advance(&mut self, name: &str) {
        self.current += 1;
        self.bar.inc(1);
        if self.reporter.mode == OutputMode::Json {
            JsonMessage::progress(self.stage, self.current, self.total, name);
        }
    }

    pub fn verbose(&self, message: impl AsRef<str>) {
        let verbose = self.reporter.verbose;
        self.console(|| verbose_println(verbose, message.as_ref()));
    }

    pub fn completed(&mut self, input: &Path, output: &Path) {
        self.console(|| {
            println!(
                "  {} {} → {}",
                style("✓").green(),
                display_name(input),
                style(output.display()).dim()
            )
        });
        if self.reporter.mode == OutputMode::Json {
            JsonMessage::file_completed(self.stage, input, output);
        }
        self.advance(display_name(input));
    }

    pub fn skipped(&mut self, input: &Path, reason: impl Display) {
        let reason = reason.to_string();
        self.console(|| {
            println!(
                "  {} {} - {}",
                style("↷").yellow(),
                display_name(input),
                style(&reason).yellow()
            )
        });
        if self.reporter.mode == OutputMode::Json {
            JsonMessage::file_skipped(self.stage, input, reason);
        }
        self.advance(display_name(input));
    }

    pub fn failed(&mut self, input: &Path, error: impl Display) {
        let error = error.to_string();
        self.console(|| {
            println!(
                "  {} {} - {}",
                style("✗").red(),
                style(display_name(input)).bold(),
                style(&error).red()
            )
        });
        if self.reporter.mode == OutputMode::Json {
            JsonMessage::file_failed(self.stage, input, error);
        }
        self.advance(display_name(input));
    }

    pub fn warn(&self, message: impl Display) {
        let message = message.to_string();
        self.console(|| warn_println(&message));
        if self.reporter.mode == OutputMode::Json {
            JsonMessage::Warning {
                stage: self.stage,
                message,
            }
            .emit();
        }
    }

    /// Close the progress bar and print the stage counts
    pub fn finish(self, summary: &impl StageSummary) {
        let counts = summary.counts();
        match self.reporter.mode {
            OutputMode::Console => {
                self.bar
                    .finish_with_message(format!("✓ {} complete", self.stage));
                println!("{}", style(format!("{} summary:", stage_title(self.stage))).bold());
                for (idx, (label, count)) in counts.iter().enumerate() {
                    let value = if idx == 0 {
                        style(*count).bold().green()
                    } else if *label == "failed" && *count > 0 {
                        style(*count).bold().red()
                    } else if *count > 0 {
                        style(*count).bold().yellow()
                    } else {
                        style(*count).dim()
                    };
                    println!("  {}: {}", label, value);
                }
                println!();
            }
            OutputMode::Json => JsonMessage::summary(self.stage, &counts),
            OutputMode::Silent => {}
        }
    }

    /// Drop the progress bar after a structural failure
    pub fn abandon(self) {
        self.bar.abandon();
    }
}

fn stage_title(stage: Stage) -> &'static str {
    match stage {
        Stage::Ingest => "Ingest",
        Stage::Process => "Process",
        Stage::Restore => "Restore",
        Stage::Normalize => "Normalize",
    }
}

/// Print the per-stage table for a whole pipeline run
pub fn print_pipeline_report(report: &PipelineReport) {
    let summaries = report.summaries();
    if summaries.is_empty() {
        return;
    }

    println!("📊 {}", style(format!("Pipeline report ({})", report.state)).bold());
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);
    table.add_row(Row::new(vec![
        Cell::new("Stage"),
        Cell::new("Result"),
        Cell::new("Failures"),
    ]));

    for summary in &summaries {
        let counts = summary
            .counts()
            .iter()
            .map(|(label, count)| format!("{} {}", count, label))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(Row::new(vec![
            Cell::new(stage_title(summary.stage())),
            Cell::new(&counts),
            Cell::new(&summary.failures().len().to_string()),
        ]));
    }
    table.printstd();

    let failures: Vec<_> = summaries
        .iter()
        .flat_map(|summary| {
            summary
                .failures()
                .iter()
                .map(move |failure| (summary.stage(), failure))
        })
        .collect();
    if !failures.is_empty() {
        println!();
        println!("{}", style("Errors encountered:").bold().red());
        for (idx, (stage, failure)) in failures.iter().enumerate() {
            println!(
                "  {}: [{}] {} - {}",
                style(format!("#{}", idx + 1)).dim(),
                stage,
                style(display_name(&failure.file)).bold().red(),
                failure.reason
            );
        }
    }
    println!();
}

/// Print mapping records as a table
pub fn print_mapping_table(records: &[FileRecord]) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);
    table.add_row(Row::new(vec![
        Cell::new("#"),
        Cell::new("Original name"),
        Cell::new("Hashed name"),
    ]));

    for (idx, record) in records.iter().enumerate() {
        table.add_row(Row::new(vec![
            Cell::new(&(idx + 1).to_string()),
            Cell::new(&record.original_name),
            Cell::new(&truncate(&record.hashed_name, 24)),
        ]));
    }

    table.printstd();
}

/// Truncate string to fit in column
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}
