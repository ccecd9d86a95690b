use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::io::IsTerminal;
use std::sync::Mutex;

/// Stages of a pathway-level analysis that report progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScoringStage {
    Fit,
    Transform,
    RankScoring,
    Permutations,
}

impl ScoringStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Fit => "fitting pathway models",
            Self::Transform => "scoring samples",
            Self::RankScoring => "rank-based pathway scoring",
            Self::Permutations => "label permutations",
        }
    }
}

impl fmt::Display for ScoringStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for per-pathway work. Called from rayon workers, hence `&self`.
pub trait ScoringProgress: Sync {
    fn on_stage_start(&self, stage: ScoringStage, total_items: usize) {
        let _ = (stage, total_items);
    }
    fn on_item_done(&self, stage: ScoringStage) {
        let _ = stage;
    }
    fn on_stage_finish(&self, stage: ScoringStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopProgress;

impl ScoringProgress for NoopProgress {}

/// Terminal progress bar; hidden when stderr is not a terminal.
#[derive(Default)]
pub struct ConsoleProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_bar(len: u64, message: &str) -> ProgressBar {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };

        let pb = ProgressBar::with_draw_target(Some(len), draw_target);
        let style = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .map(|s| s.progress_chars("█▉▊▋▌▍▎▏  "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        if let Ok(mut guard) = self.bar.lock() {
            f(&mut guard);
        }
    }
}

impl ScoringProgress for ConsoleProgress {
    fn on_stage_start(&self, stage: ScoringStage, total_items: usize) {
        self.with_bar(|bar| {
            *bar = Some(Self::create_bar(total_items as u64, stage.describe()));
        });
    }

    fn on_item_done(&self, stage: ScoringStage) {
        let _ = stage;
        self.with_bar(|bar| {
            if let Some(pb) = bar.as_ref() {
                pb.inc(1);
            }
        });
    }

    fn on_stage_finish(&self, stage: ScoringStage) {
        self.with_bar(|bar| {
            if let Some(pb) = bar.take() {
                pb.finish_with_message(format!("{stage} done"));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        done: AtomicUsize,
    }

    impl ScoringProgress for Counting {
        fn on_item_done(&self, stage: ScoringStage) {
            assert_eq!(stage, ScoringStage::Fit);
            self.done.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn default_methods_are_no_ops() {
        let counting = Counting::default();
        counting.on_stage_start(ScoringStage::Fit, 3);
        counting.on_item_done(ScoringStage::Fit);
        counting.on_stage_finish(ScoringStage::Fit);
        assert_eq!(counting.done.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn console_progress_survives_full_cycle() {
        let progress = ConsoleProgress::new();
        progress.on_item_done(ScoringStage::Transform);
        progress.on_stage_start(ScoringStage::Transform, 2);
        progress.on_item_done(ScoringStage::Transform);
        progress.on_stage_finish(ScoringStage::Transform);
        progress.on_stage_finish(ScoringStage::Transform);
    }
}
