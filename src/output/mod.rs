use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::pipeline::RunSummary;
use crate::utils::format_duration;

/// Hands out one progress bar per pipeline stage
#[derive(Clone)]
pub struct ProgressReporter {
    multi: Option<MultiProgress>,
}

impl ProgressReporter {
    /// Bars drawn to stderr
    pub fn new() -> Self {
        Self {
            multi: Some(MultiProgress::with_draw_target(ProgressDrawTarget::stderr())),
        }
    }

    /// Bars that are tracked but never drawn
    pub fn hidden() -> Self {
        Self { multi: None }
    }

    pub fn from_quiet(quiet: bool) -> Self {
        if quiet {
            Self::hidden()
        } else {
            Self::new()
        }
    }

    /// Bar for a stage expecting `len` items
    pub fn stage(&self, name: &str, len: usize) -> ProgressBar {
        let Some(multi) = &self.multi else {
            return ProgressBar::hidden();
        };

        let bar = multi.add(ProgressBar::new(len as u64));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {prefix:>12} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(name.to_string());
        bar
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Print the end-of-run report
pub fn print_summary(summary: &RunSummary) {
    println!();
    println!(
        "{} {} of {} items transcribed in {}",
        style("Done:").green().bold(),
        summary.total_transcripts(),
        summary.total_items(),
        format_duration(summary.elapsed_seconds())
    );

    for playlist in &summary.playlists {
        let status = if playlist.items == 0 {
            style("0 items").red()
        } else if playlist.transcripts == playlist.items {
            style("complete").green()
        } else {
            style("partial").yellow()
        };

        println!(
            "  {} {} ({}/{}) {}",
            style("•").dim(),
            style(&playlist.title).bold(),
            playlist.transcripts,
            playlist.items,
            status
        );
        match &playlist.merged {
            Some(path) => println!("      {}", path.display()),
            None => println!("      {}", style("no merged transcript").dim()),
        }
    }

    for report in &summary.stages {
        let failed = if report.failed > 0 {
            style(format!("{} failed", report.failed)).red()
        } else {
            style(format!("{} failed", report.failed)).dim()
        };
        println!(
            "  {:<14} {}/{} ok, {}",
            report.stage, report.succeeded, report.attempted, failed
        );
    }
}

/// Print the end-of-run report as JSON
pub fn print_summary_json(summary: &RunSummary) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
