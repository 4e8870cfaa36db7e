//! Capture controller.
//!
//! The state machine that drives one burst after another:
//!
//! ```text
//! AwaitingPermission -> Idle -> Capturing -> Finalizing -> Cooldown -> Idle -> ...
//!         |                        |
//!         v                        v
//!       Denied                  Aborted -> (cooldown) -> Idle
//! ```
//!
//! All transitions happen inside `handle` and `poll`, which the runtime calls
//! from a single thread. Time is always passed in, never read, so the whole
//! lifecycle can be driven deterministically.
//!
//! The controller owns the `CaptureSession` and the `BurstBuffer`; nothing
//! else reads or writes either of them.

use std::time::{Duration, Instant};

use crate::burst::{BurstBuffer, BurstShape};
use crate::classify::{InferenceAdapter, Prediction};
use crate::error::{ErrorClass, PipelineError};
use crate::frame::Frame;
use crate::ingest::FrameControl;
use crate::permission::PermissionStatus;
use crate::tokenize::PatchTokenizer;

/// Everything that can reach the controller.
#[derive(Debug)]
pub enum ControllerEvent {
    /// Answer to the one-time camera permission request.
    Permission(PermissionStatus),
    /// Manual start. Also resumes automatic cycling after `Cancel`.
    Start,
    /// Abort any burst or cooldown and stay idle until the next `Start`.
    Cancel,
    /// One frame tick, tagged with the burst the ticker was started for.
    Frame {
        burst: u64,
        frame: Result<Frame, PipelineError>,
    },
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    AwaitingPermission,
    /// Permission refused. Terminal.
    Denied,
    Idle,
    Capturing,
    Finalizing,
    Cooldown,
    /// Burst failed; waiting out the cooldown before returning to `Idle`.
    Aborted,
}

/// What the event loop should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

/// Progress of the burst currently being captured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSession {
    pub burst: u64,
    pub captured: usize,
    pub target: usize,
    pub started_at: Instant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerSettings {
    pub burst_frames: usize,
    /// Pause after a prediction or an abort before the next burst.
    pub cooldown: Duration,
    /// Delay between permission grant and the first automatic burst.
    pub startup_delay: Duration,
    /// Longest gap between frames before a burst is abandoned.
    pub watchdog: Duration,
    /// Longest wait in `AwaitingPermission` after a `Pending` answer.
    pub permission_timeout: Duration,
    pub auto_restart: bool,
    /// Halt on programming errors (shape mismatch and friends) instead of
    /// aborting the burst.
    pub strict_shapes: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            burst_frames: crate::DEFAULT_BURST_FRAMES,
            cooldown: Duration::from_millis(crate::DEFAULT_COOLDOWN_MS),
            startup_delay: Duration::from_millis(crate::DEFAULT_STARTUP_DELAY_MS),
            watchdog: Duration::from_millis(crate::DEFAULT_WATCHDOG_MS),
            permission_timeout: Duration::from_millis(crate::DEFAULT_PERMISSION_TIMEOUT_MS),
            auto_restart: true,
            strict_shapes: cfg!(debug_assertions),
        }
    }
}

/// Notifications for whoever presents the pipeline (console, UI, tests).
pub trait CaptureObserver {
    fn on_frame_captured(&mut self, count: usize);

    fn on_burst_complete(&mut self);

    /// Final result of one cycle. `PermissionDenied` is also reported here.
    fn on_prediction(&mut self, outcome: &Result<Prediction, PipelineError>);

    fn on_state_change(&mut self, _from: CaptureState, _to: CaptureState) {}

    fn on_burst_aborted(&mut self, _error: &PipelineError) {}
}

pub struct CaptureController {
    settings: ControllerSettings,
    tokenizer: PatchTokenizer,
    adapter: InferenceAdapter,
    buffer: BurstBuffer,
    frames: Box<dyn FrameControl>,
    observer: Box<dyn CaptureObserver>,

    state: CaptureState,
    session: Option<CaptureSession>,
    /// Permission timeout in `AwaitingPermission`, startup delay in `Idle`,
    /// watchdog in `Capturing`, cooldown in `Cooldown`/`Aborted`.
    deadline: Option<Instant>,
    last_burst: u64,
    paused: bool,
    completed: u64,
    last_outcome: Option<Result<Prediction, PipelineError>>,
    unavailable_reported: bool,
}

impl CaptureController {
    pub fn new(
        settings: ControllerSettings,
        tokenizer: PatchTokenizer,
        adapter: InferenceAdapter,
        frames: Box<dyn FrameControl>,
        observer: Box<dyn CaptureObserver>,
    ) -> Self {
        let shape = BurstShape::new(settings.burst_frames, tokenizer.config());
        Self {
            buffer: BurstBuffer::new(shape),
            settings,
            tokenizer,
            adapter,
            frames,
            observer,
            state: CaptureState::AwaitingPermission,
            session: None,
            deadline: None,
            last_burst: 0,
            paused: false,
            completed: 0,
            last_outcome: None,
            unavailable_reported: false,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffer.len()
    }

    /// Most recent prediction or error; the only externally visible result.
    pub fn last_outcome(&self) -> Option<&Result<Prediction, PipelineError>> {
        self.last_outcome.as_ref()
    }

    /// Bursts that reached the classifier, whatever the outcome.
    pub fn completed_bursts(&self) -> u64 {
        self.completed
    }

    /// True after `Cancel` until the next `Start`.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// When `poll` next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn handle(&mut self, event: ControllerEvent, now: Instant) -> Flow {
        if self.state == CaptureState::Denied {
            return Flow::Halt;
        }
        match event {
            ControllerEvent::Permission(status) => self.on_permission(status, now),
            ControllerEvent::Start => self.on_start(now),
            ControllerEvent::Cancel => {
                self.cancel();
                Flow::Continue
            }
            ControllerEvent::Frame { burst, frame } => self.on_frame(burst, frame, now),
            ControllerEvent::Shutdown => {
                self.frames.stop();
                log::info!("CaptureController: shutdown requested in {:?}", self.state);
                Flow::Halt
            }
        }
    }

    /// Fire the pending timer if it is due.
    pub fn poll(&mut self, now: Instant) -> Flow {
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return Flow::Continue,
        }
        self.deadline = None;

        match self.state {
            CaptureState::AwaitingPermission => {
                log::error!(
                    "CaptureController: no permission decision within {:?}, halting",
                    self.settings.permission_timeout
                );
                self.deny()
            }
            CaptureState::Idle if !self.paused => self.begin_capture(now),
            CaptureState::Capturing => {
                let err = PipelineError::FrameUnavailable(format!(
                    "no frame within {:?}",
                    self.settings.watchdog
                ));
                self.abort(err, now)
            }
            CaptureState::Cooldown | CaptureState::Aborted => {
                self.buffer.reset();
                self.transition(CaptureState::Idle);
                if self.settings.auto_restart && !self.paused {
                    self.begin_capture(now)
                } else {
                    Flow::Continue
                }
            }
            _ => Flow::Continue,
        }
    }

    fn on_permission(&mut self, status: PermissionStatus, now: Instant) -> Flow {
        if self.state != CaptureState::AwaitingPermission {
            log::debug!(
                "CaptureController: ignoring permission {:?} in {:?}",
                status,
                self.state
            );
            return Flow::Continue;
        }
        match status {
            PermissionStatus::Granted => {
                log::info!("CaptureController: camera permission granted");
                self.transition(CaptureState::Idle);
                self.deadline = self
                    .settings
                    .auto_restart
                    .then(|| now + self.settings.startup_delay);
                Flow::Continue
            }
            PermissionStatus::Denied => {
                log::error!("CaptureController: camera permission denied, halting");
                self.deny()
            }
            PermissionStatus::Pending => {
                // The first pending answer starts the clock; repeats do not extend it.
                if self.deadline.is_none() {
                    log::info!("CaptureController: camera permission pending");
                    self.deadline = Some(now + self.settings.permission_timeout);
                }
                Flow::Continue
            }
        }
    }

    fn deny(&mut self) -> Flow {
        self.deadline = None;
        self.transition(CaptureState::Denied);
        self.report(Err(PipelineError::PermissionDenied));
        Flow::Halt
    }

    fn on_start(&mut self, now: Instant) -> Flow {
        match self.state {
            CaptureState::Idle => {
                self.paused = false;
                self.begin_capture(now)
            }
            state => {
                log::warn!("CaptureController: start ignored in {:?}", state);
                Flow::Continue
            }
        }
    }

    fn cancel(&mut self) {
        match self.state {
            CaptureState::AwaitingPermission | CaptureState::Denied => return,
            CaptureState::Idle => {}
            _ => {
                self.frames.stop();
                self.buffer.reset();
                self.session = None;
                log::info!("CaptureController: burst cancelled");
                self.transition(CaptureState::Idle);
            }
        }
        self.deadline = None;
        self.paused = true;
    }

    fn on_frame(
        &mut self,
        burst: u64,
        frame: Result<Frame, PipelineError>,
        now: Instant,
    ) -> Flow {
        let current = self.session.as_ref().map(|s| s.burst);
        if self.state != CaptureState::Capturing || current != Some(burst) {
            log::debug!(
                "CaptureController: dropping frame for burst {} in {:?}",
                burst,
                self.state
            );
            return Flow::Continue;
        }

        let appended = frame.and_then(|frame| {
            let tokens = self.tokenizer.tokenize(&frame)?;
            self.buffer.append(&tokens)
        });
        let count = match appended {
            Ok(count) => count,
            Err(err) => return self.abort(err, now),
        };

        if let Some(session) = self.session.as_mut() {
            session.captured = count;
        }
        self.deadline = Some(now + self.settings.watchdog);
        log::debug!(
            "CaptureController: frame {}/{} of burst {}",
            count,
            self.buffer.capacity(),
            burst
        );
        self.observer.on_frame_captured(count);

        if self.buffer.is_complete() {
            self.complete_burst(now)
        } else {
            Flow::Continue
        }
    }

    fn begin_capture(&mut self, now: Instant) -> Flow {
        self.buffer.reset();
        self.last_burst += 1;
        let burst = self.last_burst;
        self.session = Some(CaptureSession {
            burst,
            captured: 0,
            target: self.buffer.capacity(),
            started_at: now,
        });
        self.transition(CaptureState::Capturing);
        self.deadline = Some(now + self.settings.watchdog);
        self.frames.start(burst);
        log::info!(
            "CaptureController: burst {} started ({} frames)",
            burst,
            self.buffer.capacity()
        );
        Flow::Continue
    }

    fn complete_burst(&mut self, now: Instant) -> Flow {
        let elapsed = self
            .session
            .as_ref()
            .map(|s| now.saturating_duration_since(s.started_at))
            .unwrap_or_default();
        self.frames.stop();
        self.deadline = None;
        self.transition(CaptureState::Finalizing);
        self.observer.on_burst_complete();

        let outcome = self
            .buffer
            .finalize()
            .and_then(|tensor| self.adapter.predict(&tensor));
        let halt = matches!(&outcome, Err(err) if self.is_fatal(err));

        match &outcome {
            Ok(prediction) => log::info!(
                "CaptureController: burst {} -> {} (class {}, score {:.4}) after {:?}",
                self.last_burst,
                prediction.label,
                prediction.index,
                prediction.score,
                elapsed
            ),
            Err(err @ PipelineError::ClassifierUnavailable(_)) => {
                if self.unavailable_reported {
                    log::debug!("CaptureController: {}", err);
                } else {
                    log::warn!("CaptureController: {}", err);
                    self.unavailable_reported = true;
                }
            }
            Err(err) if halt => log::error!("CaptureController: {}, halting", err),
            Err(err) => log::warn!("CaptureController: burst {} failed: {}", self.last_burst, err),
        }

        self.completed += 1;
        self.session = None;
        self.report(outcome);
        if halt {
            return Flow::Halt;
        }

        self.transition(CaptureState::Cooldown);
        self.deadline = Some(now + self.settings.cooldown);
        Flow::Continue
    }

    /// Drop the burst, surface the error, and retry after the cooldown.
    fn abort(&mut self, err: PipelineError, now: Instant) -> Flow {
        self.frames.stop();
        let captured = self.buffer.len();
        self.buffer.reset();
        self.session = None;
        self.observer.on_burst_aborted(&err);

        if self.is_fatal(&err) {
            log::error!(
                "CaptureController: burst {} hit {} after {} frames, halting",
                self.last_burst,
                err,
                captured
            );
            self.deadline = None;
            return Flow::Halt;
        }

        log::warn!(
            "CaptureController: burst {} aborted after {} frames: {}",
            self.last_burst,
            captured,
            err
        );
        self.transition(CaptureState::Aborted);
        self.deadline = Some(now + self.settings.cooldown);
        Flow::Continue
    }

    fn is_fatal(&self, err: &PipelineError) -> bool {
        match err.class() {
            ErrorClass::Terminal => true,
            ErrorClass::Programming => self.settings.strict_shapes,
            _ => false,
        }
    }

    fn report(&mut self, outcome: Result<Prediction, PipelineError>) {
        self.observer.on_prediction(&outcome);
        self.last_outcome = Some(outcome);
    }

    fn transition(&mut self, to: CaptureState) {
        let from = self.state;
        if from == to {
            return;
        }
        log::debug!("CaptureController: {:?} -> {:?}", from, to);
        self.state = to;
        self.observer.on_state_change(from, to);
    }
}
