use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar across the filings of one batch. A hidden tracker is a no-op.
#[derive(Clone)]
pub struct ProgressTracker {
    progress_bar: Option<ProgressBar>,
    label: String,
}

impl ProgressTracker {
    pub fn new(label: &str) -> Self {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Self {
            progress_bar: Some(pb),
            label: label.to_string(),
        }
    }

    pub fn hidden() -> Self {
        Self {
            progress_bar: None,
            label: String::new(),
        }
    }

    pub fn start(&self, total: u64) {
        if let Some(pb) = &self.progress_bar {
            pb.reset();
            pb.set_length(total);
            pb.set_position(0);
            pb.set_message(self.label.clone());
        }
    }

    pub fn update_message(&self, message: &str) {
        if let Some(pb) = &self.progress_bar {
            pb.set_message(format!("{} - {}", self.label, message));
        }
    }

    pub fn increment(&self, delta: u64) {
        if let Some(pb) = &self.progress_bar {
            pb.inc(delta);
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.progress_bar {
            pb.finish_with_message(format!("Complete [{}]", self.label));
        }
    }
}
