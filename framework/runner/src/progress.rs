use std::fmt::Write;

use game_bench_core::prelude::SweepPoint;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};

/// Displays a progress bar over the sweep points to show the user how many runs are left.
pub struct SweepProgress {
    pb: ProgressBar,
}

impl SweepProgress {
    pub fn new(points: usize) -> Self {
        let pb = ProgressBar::new(points as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{wide_bar:.cyan/blue}] [{pos}/{len} runs, {remaining} left] [{elapsed_precise}] {msg}",
        )
        .map(|style| {
            style
                .with_key("remaining", |state: &ProgressState, w: &mut dyn Write| {
                    let remaining = state.len().unwrap_or_default().saturating_sub(state.pos());
                    let _ = write!(w, "{remaining}");
                })
                .progress_chars("#>-")
        });
        match style {
            Ok(style) => pb.set_style(style),
            Err(e) => log::warn!("Failed to set progress style: {e}"),
        }

        Self { pb }
    }

    /// A progress bar that is never drawn.
    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }

    pub fn start_point(&self, point: &SweepPoint) {
        self.pb.set_message(point.to_string());
        self.pb.tick();
    }

    pub fn finish_point(&self) {
        self.pb.inc(1);
    }

    pub fn finish(&self) {
        log::trace!("Progress finished");
        self.pb.finish_and_clear();
    }
}
