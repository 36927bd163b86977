use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use harvester::harvest::HarvestProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(100);

/// Consolidated progress state to avoid multiple mutex locks.
#[derive(Default)]
struct ProgressState {
    /// Search pages resolved into names.
    discover_bar: Option<ProgressBar>,
    /// Detail records fetched.
    fetch_bar: Option<ProgressBar>,
    /// Database persistence.
    save_bar: Option<ProgressBar>,
    /// Detail failures so far, shown next to the fetch bar.
    failed: usize,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_spinner(&self, prefix: &str, message: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::spinner_style());
        pb.set_prefix(format!("{prefix:12}"));
        pb.set_message(message.to_string());
        pb.enable_steady_tick(TICK);
        pb
    }

    fn add_bar(&self, prefix: &str, len: u64) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(Self::bar_style());
        pb.set_prefix(format!("{prefix:12}"));
        pb
    }

    /// Handle a progress event.
    pub fn handle(&self, event: HarvestProgress) {
        let mut state = self.lock();

        match event {
            HarvestProgress::DiscoveryStarted => {
                state.discover_bar = Some(self.add_spinner("Discover", "Resolving index size..."));
            }

            HarvestProgress::TotalResolved { total, pages, .. } => {
                if let Some(ref pb) = state.discover_bar {
                    pb.disable_steady_tick();
                    pb.set_style(Self::bar_style());
                    pb.set_length(total);
                    pb.set_message(format!("{pages} pages"));
                }
            }

            HarvestProgress::DiscoveryTick { collected, .. } => {
                if let Some(ref pb) = state.discover_bar {
                    pb.set_position(collected as u64);
                }
            }

            HarvestProgress::PageFailed {
                page,
                error,
                final_attempt,
            } => {
                if final_attempt {
                    drop(state);
                    self.multi
                        .println(format!("✗ page {page} dropped: {error}"))
                        .ok();
                }
            }

            HarvestProgress::RetryPassStarted { pages } => {
                if let Some(ref pb) = state.discover_bar {
                    pb.set_message(format!("retrying {pages} pages..."));
                }
            }

            HarvestProgress::DiscoveryComplete {
                names,
                failed_pages,
            } => {
                if let Some(ref pb) = state.discover_bar {
                    pb.set_position(names as u64);
                    let msg = if failed_pages > 0 {
                        format!("✓ {names} names, {failed_pages} pages lost")
                    } else {
                        format!("✓ {names} names")
                    };
                    pb.finish_with_message(msg);
                }
            }

            HarvestProgress::DetailStarted {
                jobs,
                workers,
                rate_per_second,
            } => {
                let pb = self.add_bar("Fetch", jobs as u64);
                pb.set_message(format!("{workers} workers @ {rate_per_second}/s"));
                state.fetch_bar = Some(pb);
            }

            HarvestProgress::DetailTick { fetched, .. } => {
                let failed = state.failed;
                if let Some(ref pb) = state.fetch_bar {
                    pb.set_position(fetched as u64);
                    if failed > 0 {
                        pb.set_message(format!("{failed} failed"));
                    }
                }
            }

            HarvestProgress::DetailFailed { .. } => {
                state.failed += 1;
            }

            HarvestProgress::DetailComplete {
                fetched,
                failed,
                elapsed,
            } => {
                if let Some(ref pb) = state.fetch_bar {
                    pb.set_position(fetched as u64);
                    pb.finish_with_message(format!(
                        "✓ {fetched} fetched, {failed} failed in {:.1}s",
                        elapsed.as_secs_f64()
                    ));
                }
            }

            HarvestProgress::PersistStarted { count } => {
                state.save_bar = Some(self.add_spinner("Save", &format!("Saving {count} rows...")));
            }

            HarvestProgress::PersistComplete { saved, elapsed } => {
                if let Some(ref pb) = state.save_bar {
                    pb.finish_with_message(format!(
                        "✓ {saved} saved in {:.1}s",
                        elapsed.as_secs_f64()
                    ));
                }
            }

            HarvestProgress::RateLimitBackoff {
                target,
                retry_after_ms,
                attempt,
            } => {
                if let Some(ref pb) = state.fetch_bar
                    && !pb.is_finished()
                {
                    pb.set_message(format!(
                        "⏳ {target} retry {attempt} in {:.1}s",
                        retry_after_ms as f64 / 1000.0
                    ));
                }
            }

            _ => {}
        }
    }

    /// Finish all progress bars.
    pub fn finish(&self) {
        let state = self.lock();
        for pb in [&state.discover_bar, &state.fetch_bar, &state.save_bar]
            .into_iter()
            .flatten()
        {
            if !pb.is_finished() {
                pb.finish();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .expect("Invalid template")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}")
            .expect("Invalid template")
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
