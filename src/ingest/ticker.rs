//! Fixed-interval frame delivery.
//!
//! `FrameTicker` owns a `FrameSource` on its own thread. While started it
//! captures one frame per tick and sends it to the controller's event channel,
//! tagged with the burst it was started for. The controller is the only
//! consumer, so every append happens on the controller's thread in capture
//! order.
//!
//! The source is connected lazily on the first tick after `start`, so the
//! device stays closed until the controller actually begins a burst. A failed
//! connect is delivered like a failed capture and retried on the next start.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::FrameSource;
use crate::controller::ControllerEvent;
use crate::error::PipelineError;

/// Start/stop switch the controller holds over frame delivery.
pub trait FrameControl: Send {
    /// Begin delivering frames stamped with `burst`.
    fn start(&mut self, burst: u64);

    /// Stop delivering frames. Frames already in the channel may still arrive.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Longest the thread sleeps between checks while stopped.
const IDLE_POLL: Duration = Duration::from_millis(5);

pub struct FrameTicker {
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    burst: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl FrameTicker {
    /// Move `source` onto the ticker thread. It is connected on first use.
    pub fn spawn(
        source: Box<dyn FrameSource>,
        interval: Duration,
        events: Sender<ControllerEvent>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let burst = Arc::new(AtomicU64::new(0));

        let thread_running = running.clone();
        let thread_shutdown = shutdown.clone();
        let thread_burst = burst.clone();
        let join = std::thread::Builder::new()
            .name("frame-ticker".into())
            .spawn(move || {
                run_ticker(
                    source,
                    interval,
                    events,
                    thread_running,
                    thread_shutdown,
                    thread_burst,
                )
            })
            .context("spawn frame ticker thread")?;

        Ok(Self {
            running,
            shutdown,
            burst,
            join: Some(join),
        })
    }
}

impl FrameControl for FrameTicker {
    fn start(&mut self, burst: u64) {
        self.burst.store(burst, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for FrameTicker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("FrameTicker: capture thread panicked");
            }
        }
    }
}

fn run_ticker(
    mut source: Box<dyn FrameSource>,
    interval: Duration,
    events: Sender<ControllerEvent>,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    burst: Arc<AtomicU64>,
) {
    let mut next_tick: Option<Instant> = None;
    let mut connected = false;
    while !shutdown.load(Ordering::SeqCst) {
        if !running.load(Ordering::SeqCst) {
            next_tick = None;
            std::thread::sleep(IDLE_POLL);
            continue;
        }

        let now = Instant::now();
        let due = *next_tick.get_or_insert(now);
        if now < due {
            std::thread::sleep((due - now).min(IDLE_POLL));
            continue;
        }
        next_tick = Some(due + interval);

        let id = burst.load(Ordering::SeqCst);
        if !connected {
            if let Err(err) = source.connect() {
                log::warn!(
                    "FrameTicker: cannot connect {}: {:#}",
                    source.stats().location,
                    err
                );
                let frame = Err(PipelineError::FrameUnavailable(format!(
                    "connect frame source: {:#}",
                    err
                )));
                if events.send(ControllerEvent::Frame { burst: id, frame }).is_err() {
                    break;
                }
                continue;
            }
            log::info!("FrameTicker: connected {}", source.stats().location);
            connected = true;
        }

        let frame = source.next_frame().map_err(|err| {
            if !source.is_healthy() {
                log::warn!(
                    "FrameTicker: source {} unhealthy: {:#}",
                    source.stats().location,
                    err
                );
            }
            PipelineError::FrameUnavailable(format!("{:#}", err))
        });
        if events
            .send(ControllerEvent::Frame { burst: id, frame })
            .is_err()
        {
            log::debug!("FrameTicker: event channel closed, stopping");
            break;
        }
    }
    log::debug!(
        "FrameTicker: stopped after {} frames",
        source.stats().frames_captured
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SourceSettings, SyntheticSource};
    use std::sync::mpsc;

    fn gray_source() -> Box<dyn FrameSource> {
        Box::new(
            SyntheticSource::new(SourceSettings {
                url: "stub://gray/7".into(),
                width: 4,
                height: 4,
            })
            .unwrap(),
        )
    }

    #[test]
    fn delivers_frames_only_while_started() {
        let (tx, rx) = mpsc::channel();
        let mut ticker = FrameTicker::spawn(gray_source(), Duration::from_millis(2), tx).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err());

        ticker.start(9);
        assert!(ticker.is_running());
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        match event {
            ControllerEvent::Frame { burst, frame } => {
                assert_eq!(burst, 9);
                assert!(frame.is_ok());
            }
            other => panic!("unexpected event {:?}", other),
        }

        ticker.stop();
        std::thread::sleep(Duration::from_millis(20));
        while rx.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err());
    }

    /// Counts `connect` calls; fails them while `refuse` is set.
    struct Gate {
        connects: Arc<AtomicU64>,
        refuse: bool,
    }

    impl FrameSource for Gate {
        fn connect(&mut self) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                anyhow::bail!("device busy");
            }
            Ok(())
        }

        fn next_frame(&mut self) -> Result<crate::frame::Frame> {
            crate::frame::Frame::solid(4, 4, [1, 1, 1])
        }

        fn is_healthy(&self) -> bool {
            true
        }

        fn stats(&self) -> crate::ingest::SourceStats {
            crate::ingest::SourceStats {
                frames_captured: 0,
                location: "gate".into(),
            }
        }
    }

    #[test]
    fn source_is_connected_on_first_start_only() {
        let connects = Arc::new(AtomicU64::new(0));
        let source = Gate {
            connects: connects.clone(),
            refuse: false,
        };
        let (tx, rx) = mpsc::channel();
        let mut ticker = FrameTicker::spawn(Box::new(source), Duration::from_millis(1), tx).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(connects.load(Ordering::SeqCst), 0);

        ticker.start(1);
        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_connect_is_reported_as_frame_unavailable() {
        let connects = Arc::new(AtomicU64::new(0));
        let source = Gate {
            connects: connects.clone(),
            refuse: true,
        };
        let (tx, rx) = mpsc::channel();
        let mut ticker = FrameTicker::spawn(Box::new(source), Duration::from_millis(1), tx).unwrap();
        ticker.start(4);
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            ControllerEvent::Frame {
                burst: 4,
                frame: Err(PipelineError::FrameUnavailable(msg)),
            } => assert!(msg.contains("device busy")),
            other => panic!("unexpected event {:?}", other),
        }
        ticker.stop();
        assert!(connects.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn capture_errors_become_frame_unavailable() {
        let source = SyntheticSource::new(SourceSettings {
            url: "stub://fail-every/1".into(),
            width: 4,
            height: 4,
        })
        .unwrap();
        let (tx, rx) = mpsc::channel();
        let mut ticker = FrameTicker::spawn(Box::new(source), Duration::from_millis(1), tx).unwrap();
        ticker.start(1);
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            ControllerEvent::Frame { frame: Err(err), .. } => {
                assert!(matches!(err, PipelineError::FrameUnavailable(_)));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
