use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use sign_burst::{CaptureObserver, CaptureState, PipelineError, Prediction};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Console presentation: stage spinners during startup, then a per-burst
/// progress bar. Falls back to plain stderr lines off a TTY.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self { mode, is_tty }
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Observer that shows capture progress for bursts of `frames` frames.
    pub fn observer(&self, frames: usize) -> ConsoleObserver {
        let bar = self.pretty().then(|| {
            let bar = ProgressBar::new(frames as u64);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{prefix} [{bar:40}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
            bar.set_style(style);
            bar
        });
        ConsoleObserver {
            frames,
            bar,
            burst: 0,
            started: None,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct ConsoleObserver {
    frames: usize,
    bar: Option<ProgressBar>,
    burst: u64,
    started: Option<Instant>,
}

impl CaptureObserver for ConsoleObserver {
    fn on_frame_captured(&mut self, count: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(count as u64);
        } else if count == self.frames / 2 {
            eprintln!("    burst {}: {}/{} frames", self.burst, count, self.frames);
        }
    }

    fn on_burst_complete(&mut self) {
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        let message = format!("captured in {}", format_duration(elapsed));
        match &self.bar {
            Some(bar) => bar.set_message(message),
            None => eprintln!("    burst {}: {}", self.burst, message),
        }
    }

    fn on_prediction(&mut self, outcome: &Result<Prediction, PipelineError>) {
        let line = match outcome {
            Ok(prediction) => format!(
                "→ {} (class {}, score {:.3})",
                prediction.label, prediction.index, prediction.score
            ),
            Err(err) => format!("✘ {}", err),
        };
        self.println(&line);
    }

    fn on_state_change(&mut self, _from: CaptureState, to: CaptureState) {
        match to {
            CaptureState::Capturing => {
                self.burst += 1;
                self.started = Some(Instant::now());
                match &self.bar {
                    Some(bar) => {
                        bar.reset();
                        bar.set_prefix(format!("burst {}", self.burst));
                        bar.set_message("");
                    }
                    None => eprintln!("==> burst {} capturing", self.burst),
                }
            }
            CaptureState::Idle => {
                if let Some(bar) = &self.bar {
                    bar.set_message("idle");
                }
            }
            _ => {}
        }
    }

    fn on_burst_aborted(&mut self, error: &PipelineError) {
        self.println(&format!("✘ burst {} aborted: {}", self.burst, error));
    }
}

impl ConsoleObserver {
    fn println(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }
}

impl Drop for ConsoleObserver {
    fn drop(&mut self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
