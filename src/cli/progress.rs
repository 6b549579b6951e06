use std::collections::HashMap;
use std::time::{Duration, Instant};

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::models::finding::SourceId;
use crate::pipeline::events::RunEvent;
use crate::utils::formatting::format_duration;

/// One bar per run, ticking once per finished dimension.
pub struct ReviewProgress {
    multi: MultiProgress,
    run_bars: HashMap<SourceId, ProgressBar>,
    status_bar: ProgressBar,
    completed: usize,
    failed: usize,
    start_time: Instant,
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {prefix:>12} {bar:30.cyan/dark_gray} {pos}/{len} dimensions | {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

impl ReviewProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        status_bar.set_message("Starting review...");
        status_bar.enable_steady_tick(Duration::from_millis(120));

        Self {
            multi,
            run_bars: HashMap::new(),
            status_bar,
            completed: 0,
            failed: 0,
            start_time: Instant::now(),
        }
    }

    pub fn handle_event(&mut self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted { label, dimensions } => {
                let bar = self.multi.insert_before(&self.status_bar, ProgressBar::new(*dimensions as u64));
                bar.set_style(bar_style());
                bar.set_prefix(label.to_string());
                bar.set_message("pending");
                self.run_bars.insert(label.clone(), bar);
            }
            RunEvent::PhaseChanged { label, phase } => {
                if let Some(bar) = self.run_bars.get(label) {
                    bar.set_message(phase.to_string());
                }
            }
            RunEvent::DimensionCompleted { label, .. } => {
                if let Some(bar) = self.run_bars.get(label) {
                    bar.inc(1);
                }
            }
            RunEvent::DimensionFailed { label, dimension, kind, .. } => {
                if let Some(bar) = self.run_bars.get(label) {
                    bar.inc(1);
                }
                self.println(&format!(
                    "  {} {} / {} failed ({})",
                    style("!").yellow(),
                    label,
                    dimension,
                    kind
                ));
            }
            RunEvent::RunCompleted { label, findings, duration_ms } => {
                self.completed += 1;
                if let Some(bar) = self.run_bars.remove(label) {
                    bar.finish_with_message(format!("{} findings in {}", findings, format_duration(*duration_ms)));
                }
            }
            RunEvent::RunFailed { label, phase, error } => {
                self.failed += 1;
                if let Some(bar) = self.run_bars.remove(label) {
                    bar.abandon_with_message(format!("failed during {}: {}", phase, error));
                }
            }
            RunEvent::ArbitrationResolved { finding, resolved, arbitrator } => {
                let verdict = resolved
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unresolved".to_string());
                self.println(&format!("  {} {} -> {} ({})", style("⚖").cyan(), finding, verdict, arbitrator));
            }
        }
        self.update_status();
    }

    fn update_status(&self) {
        self.status_bar.set_message(format!(
            "{} | {} completed | {} failed",
            format_duration(self.start_time.elapsed().as_millis() as u64),
            self.completed,
            self.failed,
        ));
    }

    pub fn finish(&mut self) {
        for (_, bar) in self.run_bars.drain() {
            bar.finish_and_clear();
        }
        self.status_bar.finish_and_clear();
    }

    /// Print a line through the multi-progress (won't interfere with bars).
    pub fn println(&self, msg: &str) {
        let _ = self.multi.println(msg);
    }
}

impl Default for ReviewProgress {
    fn default() -> Self {
        Self::new()
    }
}
