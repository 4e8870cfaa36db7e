//! Serialized event loop.
//!
//! Every input to the controller (permission answer, frame ticks, start,
//! cancel, shutdown) arrives as a `ControllerEvent` on one channel. The loop
//! drains that channel on the calling thread and sleeps until the
//! controller's next deadline when nothing arrives, so no two transitions ever
//! run concurrently.
//!
//! `run` consumes the runtime and drops its own sender first, so the loop ends
//! with `StopReason::Disconnected` once every producer is gone.

use anyhow::{Context, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crate::classify::Prediction;
use crate::controller::{CaptureController, CaptureState, ControllerEvent, Flow};
use crate::error::PipelineError;
use crate::permission::{CameraPermission, PermissionStatus};

/// Pause between permission requests while the answer is `Pending`.
const PERMISSION_RETRY: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunLimits {
    /// Stop after this many bursts reached the classifier.
    pub max_bursts: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The controller asked to stop (shutdown, denial, fatal error).
    Halted,
    BurstLimit,
    /// Every sender is gone.
    Disconnected,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub bursts: u64,
    pub final_state: CaptureState,
    pub last_outcome: Option<Result<Prediction, PipelineError>>,
    pub reason: StopReason,
}

pub struct PipelineRuntime {
    events: Sender<ControllerEvent>,
    inbox: Receiver<ControllerEvent>,
}

impl PipelineRuntime {
    pub fn new() -> Self {
        let (events, inbox) = mpsc::channel();
        Self { events, inbox }
    }

    /// Handle for producers: the frame ticker, signal handlers, a UI.
    pub fn sender(&self) -> Sender<ControllerEvent> {
        self.events.clone()
    }

    /// Ask for camera access off the event loop thread.
    ///
    /// A `Pending` answer is asked again every `PERMISSION_RETRY` until `wait`
    /// has passed. Every answer is forwarded; the controller decides when a
    /// pending request has waited too long.
    pub fn request_permission(
        &self,
        permission: Box<dyn CameraPermission>,
        wait: Duration,
    ) -> Result<()> {
        let events = self.events.clone();
        std::thread::Builder::new()
            .name("camera-permission".into())
            .spawn(move || {
                let asked_at = Instant::now();
                loop {
                    let status = permission.request();
                    log::debug!("PipelineRuntime: permission answer {:?}", status);
                    if events.send(ControllerEvent::Permission(status)).is_err() {
                        break;
                    }
                    if status != PermissionStatus::Pending || asked_at.elapsed() >= wait {
                        break;
                    }
                    std::thread::sleep(PERMISSION_RETRY.min(wait));
                }
            })
            .context("spawn permission thread")?;
        Ok(())
    }

    pub fn run(self, controller: &mut CaptureController, limits: RunLimits) -> Result<RunSummary> {
        let Self { events, inbox } = self;
        drop(events);

        let reason = loop {
            if limits
                .max_bursts
                .is_some_and(|max| controller.completed_bursts() >= max)
            {
                controller.handle(ControllerEvent::Shutdown, Instant::now());
                break StopReason::BurstLimit;
            }

            if controller.poll(Instant::now()) == Flow::Halt {
                break StopReason::Halted;
            }

            let received = match controller.next_deadline() {
                Some(deadline) => {
                    inbox.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(event) => {
                    if controller.handle(event, Instant::now()) == Flow::Halt {
                        break StopReason::Halted;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break StopReason::Disconnected,
            }
        };

        log::info!(
            "PipelineRuntime: stopped ({:?}) after {} bursts in {:?}",
            reason,
            controller.completed_bursts(),
            controller.state()
        );
        Ok(RunSummary {
            bursts: controller.completed_bursts(),
            final_state: controller.state(),
            last_outcome: controller.last_outcome().cloned(),
            reason,
        })
    }
}

impl Default for PipelineRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::burst::BurstShape;
    use crate::classify::{InferenceAdapter, LabelVocabulary, StubClassifier};
    use crate::controller::{CaptureObserver, ControllerSettings};
    use crate::ingest::{open_source, FrameControl, FrameTicker, SourceSettings};
    use crate::permission::StaticPermission;
    use crate::tokenize::{PatchTokenizer, TokenizerConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const WAIT: Duration = Duration::from_millis(200);

    #[derive(Clone, Default)]
    struct Counts(Arc<Mutex<(usize, usize)>>);

    impl CaptureObserver for Counts {
        fn on_frame_captured(&mut self, _count: usize) {
            self.0.lock().unwrap().0 += 1;
        }

        fn on_burst_complete(&mut self) {}

        fn on_prediction(&mut self, _outcome: &Result<Prediction, PipelineError>) {
            self.0.lock().unwrap().1 += 1;
        }
    }

    /// Frame control that never produces frames.
    struct Silent;

    impl FrameControl for Silent {
        fn start(&mut self, _burst: u64) {}

        fn stop(&mut self) {}

        fn is_running(&self) -> bool {
            false
        }
    }

    /// Answers `Pending` a fixed number of times, then `Granted`.
    struct SlowGrant {
        pending: usize,
        asked: Arc<AtomicUsize>,
    }

    impl CameraPermission for SlowGrant {
        fn request(&self) -> PermissionStatus {
            if self.asked.fetch_add(1, Ordering::SeqCst) < self.pending {
                PermissionStatus::Pending
            } else {
                PermissionStatus::Granted
            }
        }
    }

    fn controller_with(
        frames: Box<dyn FrameControl>,
        counts: Counts,
        permission_timeout: Duration,
    ) -> Result<CaptureController> {
        let tokenizer = TokenizerConfig {
            resize_edge: 4,
            patch_edge: 2,
            crop: None,
        };
        let settings = ControllerSettings {
            burst_frames: 3,
            cooldown: Duration::from_millis(5),
            startup_delay: Duration::ZERO,
            watchdog: Duration::from_millis(500),
            permission_timeout,
            auto_restart: true,
            strict_shapes: true,
        };
        Ok(CaptureController::new(
            settings,
            PatchTokenizer::new(tokenizer)?,
            InferenceAdapter::with_classifier(
                StubClassifier::new(25),
                LabelVocabulary::standard(),
                BurstShape::new(3, &tokenizer),
            ),
            frames,
            Box::new(counts),
        ))
    }

    fn build_controller(
        runtime: &PipelineRuntime,
        counts: Counts,
        permission_timeout: Duration,
    ) -> Result<CaptureController> {
        let source = open_source(&SourceSettings {
            url: "stub://gray/128".into(),
            width: 8,
            height: 8,
        })?;
        let ticker = FrameTicker::spawn(source, Duration::from_millis(1), runtime.sender())?;
        controller_with(Box::new(ticker), counts, permission_timeout)
    }

    #[test]
    fn runs_bursts_until_limit() -> Result<()> {
        let runtime = PipelineRuntime::new();
        let counts = Counts::default();
        let mut controller = build_controller(&runtime, counts.clone(), WAIT)?;
        runtime.request_permission(
            Box::new(StaticPermission(PermissionStatus::Granted)),
            WAIT,
        )?;

        let summary = runtime.run(
            &mut controller,
            RunLimits {
                max_bursts: Some(2),
            },
        )?;
        assert_eq!(summary.reason, StopReason::BurstLimit);
        assert_eq!(summary.bursts, 2);
        assert!(matches!(summary.last_outcome, Some(Ok(_))));
        let (frames, predictions) = *counts.0.lock().unwrap();
        assert_eq!(frames, 6);
        assert_eq!(predictions, 2);
        Ok(())
    }

    #[test]
    fn denied_permission_stops_the_loop() -> Result<()> {
        let runtime = PipelineRuntime::new();
        let mut controller = build_controller(&runtime, Counts::default(), WAIT)?;
        runtime.request_permission(
            Box::new(StaticPermission(PermissionStatus::Denied)),
            WAIT,
        )?;

        let summary = runtime.run(&mut controller, RunLimits::default())?;
        assert_eq!(summary.reason, StopReason::Halted);
        assert_eq!(summary.final_state, CaptureState::Denied);
        assert_eq!(summary.last_outcome, Some(Err(PipelineError::PermissionDenied)));
        assert_eq!(summary.bursts, 0);
        Ok(())
    }

    #[test]
    fn pending_permission_gives_up_as_denied() -> Result<()> {
        let runtime = PipelineRuntime::new();
        let mut controller = build_controller(&runtime, Counts::default(), WAIT)?;
        runtime.request_permission(
            Box::new(StaticPermission(PermissionStatus::Pending)),
            WAIT,
        )?;

        let asked_at = Instant::now();
        let summary = runtime.run(&mut controller, RunLimits::default())?;
        assert!(asked_at.elapsed() >= WAIT);
        assert_eq!(summary.reason, StopReason::Halted);
        assert_eq!(summary.final_state, CaptureState::Denied);
        assert_eq!(summary.last_outcome, Some(Err(PipelineError::PermissionDenied)));
        Ok(())
    }

    #[test]
    fn pending_permission_is_asked_again() -> Result<()> {
        let runtime = PipelineRuntime::new();
        let mut controller = build_controller(&runtime, Counts::default(), Duration::from_secs(5))?;
        let asked = Arc::new(AtomicUsize::new(0));
        runtime.request_permission(
            Box::new(SlowGrant {
                pending: 1,
                asked: asked.clone(),
            }),
            Duration::from_secs(5),
        )?;

        let summary = runtime.run(
            &mut controller,
            RunLimits {
                max_bursts: Some(1),
            },
        )?;
        assert_eq!(summary.reason, StopReason::BurstLimit);
        assert_eq!(summary.bursts, 1);
        assert_eq!(asked.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn loop_ends_when_every_producer_is_gone() -> Result<()> {
        let runtime = PipelineRuntime::new();
        let mut controller = controller_with(Box::new(Silent), Counts::default(), WAIT)?;
        runtime.request_permission(
            Box::new(StaticPermission(PermissionStatus::Granted)),
            WAIT,
        )?;

        let summary = runtime.run(&mut controller, RunLimits::default())?;
        assert_eq!(summary.reason, StopReason::Disconnected);
        assert_eq!(summary.final_state, CaptureState::Capturing);
        Ok(())
    }

    #[test]
    fn shutdown_event_halts() -> Result<()> {
        let runtime = PipelineRuntime::new();
        let mut controller = build_controller(&runtime, Counts::default(), WAIT)?;
        runtime.sender().send(ControllerEvent::Shutdown)?;
        let summary = runtime.run(&mut controller, RunLimits::default())?;
        assert_eq!(summary.reason, StopReason::Halted);
        assert_eq!(summary.final_state, CaptureState::AwaitingPermission);
        Ok(())
    }
}
