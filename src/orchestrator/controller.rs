//! Capture-run lifecycle controller.
//!
//! Owns the single-flight run slot and the abort flag, launches the slide sequence in
//! the background, and emits the terminal event for every run it accepted.

use super::bus::EventBus;
use crate::engine::{
    Actuator, CameraControl, ProgressSink, SequenceEnd, SequenceReport, SequenceTiming,
    SlideSequence,
};
use crate::error::ControlError;
use crate::model::{
    now_rfc3339, ActiveRun, CameraTarget, ControllerConfig, ControllerPhase, ProgressEvent,
    ProgressFrame, RunOutcome, RunRequest, RunSummary, StatusSnapshot,
};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 256;

/// Returned to the caller of an accepted start request.
#[derive(Debug, Clone)]
pub struct RunAccepted {
    pub run_id: u64,
    pub camera: CameraTarget,
    pub slide_count: u32,
}

#[derive(Debug)]
struct RunState {
    phase: ControllerPhase,
    active: Option<ActiveRun>,
    last_run: Option<RunSummary>,
}

struct Inner {
    state: Mutex<RunState>,
    /// Cleared only when a run is accepted, under `state`.
    abort: Arc<AtomicBool>,
    next_run_id: AtomicU64,
    actuator: Arc<dyn Actuator>,
    camera: Arc<dyn CameraControl>,
    bus: EventBus,
    timing: SequenceTiming,
    max_slides: u32,
    fatal: CancellationToken,
    shutdown: CancellationToken,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive claim on the controller. Dropping it always returns the controller to idle.
struct Slot {
    inner: Arc<Inner>,
}

impl Slot {
    /// Atomically move from idle to `phase`, or report `Busy`.
    fn try_claim(inner: &Arc<Inner>, phase: ControllerPhase) -> Result<Self, ControlError> {
        let mut state = inner.state();
        if state.phase != ControllerPhase::Idle {
            return Err(ControlError::Busy);
        }
        state.phase = phase;
        Ok(Self {
            inner: Arc::clone(inner),
        })
    }

    /// Return to idle and record the summary, then run `announce` before the state lock
    /// is released. A run accepted afterwards can only publish after `announce`.
    fn finish(self, summary: RunSummary, announce: impl FnOnce()) {
        let mut state = self.inner.state();
        state.phase = ControllerPhase::Idle;
        state.active = None;
        state.last_run = Some(summary);
        announce();
        drop(state);
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let mut state = self.inner.state();
        state.phase = ControllerPhase::Idle;
        state.active = None;
    }
}

/// Publishes the frames of one run in order and mirrors slide progress into the status.
struct RunReporter {
    inner: Arc<Inner>,
    run_id: u64,
    sequence: AtomicU64,
}

impl RunReporter {
    fn publish(&self, event: ProgressEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.bus.publish(ProgressFrame {
            run_id: self.run_id,
            sequence,
            event,
        });
    }
}

impl ProgressSink for RunReporter {
    fn slide_advanced(&self, current_slide: u32, total_slides: u32) {
        if let Some(active) = self.inner.state().active.as_mut() {
            active.current_slide = current_slide;
        }
        self.publish(ProgressEvent::InProgress {
            current_slide,
            total_slides,
        });
    }
}

/// Cheap to clone; all clones share one run slot.
#[derive(Clone)]
pub struct RunController {
    inner: Arc<Inner>,
}

impl RunController {
    pub fn new(
        cfg: &ControllerConfig,
        actuator: Arc<dyn Actuator>,
        camera: Arc<dyn CameraControl>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RunState {
                    phase: ControllerPhase::Idle,
                    active: None,
                    last_run: None,
                }),
                abort: Arc::new(AtomicBool::new(false)),
                next_run_id: AtomicU64::new(1),
                actuator,
                camera,
                bus: EventBus::new(EVENT_CAPACITY),
                timing: SequenceTiming::from(cfg),
                max_slides: cfg.max_slides,
                fatal: CancellationToken::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Validate, probe the camera, and launch a run in the background.
    ///
    /// Returns as soon as the run is accepted; progress arrives on [`Self::subscribe`].
    pub async fn start_run(
        &self,
        camera: &str,
        slide_count: u32,
    ) -> Result<RunAccepted, ControlError> {
        let camera =
            CameraTarget::parse(camera).ok_or_else(|| ControlError::InvalidCamera(camera.into()))?;
        if slide_count == 0 || slide_count > self.inner.max_slides {
            return Err(ControlError::InvalidSlideCount {
                requested: slide_count,
                max: self.inner.max_slides,
            });
        }

        let slot = Slot::try_claim(&self.inner, ControllerPhase::Preflight).inspect_err(|_| {
            tracing::warn!("Request rejected: System is currently capturing.");
        })?;

        if !self.inner.camera.ping(&camera).await {
            tracing::error!(%camera, "Request rejected: DigiCamControl is not available.");
            return Err(ControlError::CameraUnavailable);
        }

        let run_id = self.inner.next_run_id.fetch_add(1, Ordering::SeqCst);
        let started_at = now_rfc3339();
        {
            let mut state = self.inner.state();
            self.inner.abort.store(false, Ordering::SeqCst);
            state.phase = ControllerPhase::Running;
            state.active = Some(ActiveRun {
                run_id,
                camera: camera.clone(),
                total_slides: slide_count,
                current_slide: 0,
                abort_requested: false,
                started_at: started_at.clone(),
            });
        }

        tracing::info!(run_id, %camera, slide_count, "Starting capture run.");
        let request = RunRequest {
            camera: camera.clone(),
            slide_count,
        };
        tokio::spawn(supervise_run(slot, run_id, request, started_at));

        Ok(RunAccepted {
            run_id,
            camera,
            slide_count,
        })
    }

    /// Ask the active run to stop at its next slide boundary.
    pub fn abort(&self) -> Result<u64, ControlError> {
        let mut state = self.inner.state();
        if state.phase != ControllerPhase::Running {
            return Err(ControlError::NothingToAbort);
        }
        self.inner.abort.store(true, Ordering::SeqCst);
        let active = state.active.as_mut().ok_or(ControlError::NothingToAbort)?;
        active.abort_requested = true;
        tracing::warn!(run_id = active.run_id, "Abort requested.");
        Ok(active.run_id)
    }

    /// Pulse the projector back one slide. Blocks until the pulse has completed.
    pub async fn reverse_one_slide(&self) -> Result<(), ControlError> {
        let _slot = Slot::try_claim(&self.inner, ControllerPhase::Reversing).inspect_err(|_| {
            tracing::warn!("Reverse rejected: System is currently capturing.");
        })?;
        tracing::info!("Reversing one slide.");
        self.inner.actuator.pulse_reverse().await.map_err(|fault| {
            tracing::error!(%fault, "actuator fault during reverse");
            self.inner.fatal.cancel();
            ControlError::from(fault)
        })
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.inner.state();
        StatusSnapshot {
            state: state.phase,
            active: state.active.clone(),
            last_run: state.last_run.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressFrame> {
        self.inner.bus.subscribe()
    }

    /// Cancelled once an actuator fault makes continued operation unsafe.
    pub fn fatal_signal(&self) -> CancellationToken {
        self.inner.fatal.clone()
    }

    /// Cancelled when the process starts shutting down; long-lived observers end on it.
    pub fn shutdown_signal(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }
}

/// Run the sequence to its end, then release the slot and emit the single terminal event.
async fn supervise_run(slot: Slot, run_id: u64, request: RunRequest, started_at: String) {
    let inner = Arc::clone(&slot.inner);
    let reporter = Arc::new(RunReporter {
        inner: Arc::clone(&inner),
        run_id,
        sequence: AtomicU64::new(0),
    });
    let camera = request.camera.clone();
    let requested = request.slide_count;

    let sequence = SlideSequence::new(request, inner.timing);
    let handle = tokio::spawn(sequence.run(
        Arc::clone(&inner.actuator),
        Arc::clone(&inner.camera),
        reporter.clone(),
        Arc::clone(&inner.abort),
    ));

    let (event, outcome, captured) = match handle.await {
        Ok(SequenceReport { end, captured }) => {
            let (event, outcome) = terminal_event(end, &inner);
            (event, outcome, captured)
        }
        Err(e) => {
            tracing::error!(run_id, error = %e, "capture run task failed");
            (
                ProgressEvent::Error {
                    message: format!("Capture run failed: {e}"),
                },
                RunOutcome::Failed,
                0,
            )
        }
    };

    debug_assert!(event.is_terminal());
    let error = match &event {
        ProgressEvent::Error { message } => Some(message.clone()),
        _ => None,
    };
    tracing::info!(run_id, captured, requested, outcome = ?outcome, "capture run finished");
    let summary = RunSummary {
        run_id,
        camera,
        requested,
        captured,
        outcome,
        error,
        started_at,
        finished_at: now_rfc3339(),
    };
    slot.finish(summary, || reporter.publish(event));
}

fn terminal_event(end: SequenceEnd, inner: &Inner) -> (ProgressEvent, RunOutcome) {
    match end {
        SequenceEnd::Completed => (ProgressEvent::Completed, RunOutcome::Completed),
        SequenceEnd::Aborted => (ProgressEvent::Aborted, RunOutcome::Aborted),
        SequenceEnd::CaptureFailed(e) => (
            ProgressEvent::Error {
                message: format!("Error capturing image: {e}"),
            },
            RunOutcome::Failed,
        ),
        SequenceEnd::ActuatorFault(fault) => {
            tracing::error!(%fault, "actuator fault during capture run");
            inner.fatal.cancel();
            (
                ProgressEvent::Error {
                    message: format!("Projector actuator fault: {fault}"),
                },
                RunOutcome::Failed,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::ScriptedCamera;
    use crate::engine::ActuatorDriver;
    use crate::hardware::SimulatedLine;
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    struct Rig {
        controller: RunController,
        line: SimulatedLine,
        camera: Arc<ScriptedCamera>,
    }

    fn rig(camera: ScriptedCamera) -> Rig {
        let cfg = ControllerConfig::default();
        let line = SimulatedLine::new();
        let actuator =
            ActuatorDriver::initialize(line.clone(), cfg.advance_pulse, cfg.reverse_pulse)
                .unwrap();
        let camera = Arc::new(camera);
        let controller = RunController::new(&cfg, Arc::new(actuator), camera.clone());
        Rig {
            controller,
            line,
            camera,
        }
    }

    /// Collect frames until the run's terminal event.
    async fn drain_run(rx: &mut broadcast::Receiver<ProgressFrame>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        loop {
            let frame = rx.recv().await.unwrap();
            let terminal = frame.event.is_terminal();
            events.push(frame.event);
            if terminal {
                return events;
            }
        }
    }

    fn in_progress(current_slide: u32, total_slides: u32) -> ProgressEvent {
        ProgressEvent::InProgress {
            current_slide,
            total_slides,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_emits_every_slide_then_completed() {
        let rig = rig(ScriptedCamera::healthy());
        let mut rx = rig.controller.subscribe();

        let accepted = rig.controller.start_run("10.0.0.5", 3).await.unwrap();
        assert_eq!(accepted.slide_count, 3);
        assert_eq!(rig.controller.status().state, ControllerPhase::Running);

        let events = drain_run(&mut rx).await;
        assert_eq!(
            events,
            vec![
                in_progress(1, 3),
                in_progress(2, 3),
                in_progress(3, 3),
                ProgressEvent::Completed
            ]
        );

        let status = rig.controller.status();
        assert_eq!(status.state, ControllerPhase::Idle);
        assert!(status.active.is_none());
        let last = status.last_run.unwrap();
        assert_eq!(last.run_id, accepted.run_id);
        assert_eq!(last.outcome, RunOutcome::Completed);
        assert_eq!(last.captured, 3);
        assert_eq!(rig.line.pulses().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_carry_run_id_and_consecutive_sequence() {
        let rig = rig(ScriptedCamera::healthy());
        let mut rx = rig.controller.subscribe();

        let accepted = rig.controller.start_run("10.0.0.5", 2).await.unwrap();
        let mut frames = Vec::new();
        for _ in 0..3 {
            frames.push(rx.recv().await.unwrap());
        }

        assert!(frames.iter().all(|f| f.run_id == accepted.run_id));
        let sequences: Vec<_> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_failure_on_second_slide_ends_run_with_error() {
        let rig = rig(ScriptedCamera::failing_on(2));
        let mut rx = rig.controller.subscribe();

        rig.controller.start_run("10.0.0.5", 3).await.unwrap();
        let events = drain_run(&mut rx).await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], in_progress(1, 3));
        assert_eq!(events[1], in_progress(2, 3));
        assert!(
            matches!(&events[2], ProgressEvent::Error { message } if message.contains("500"))
        );
        assert_eq!(rig.controller.status().state, ControllerPhase::Idle);
        assert_eq!(rig.camera.capture_times().len(), 2);

        // Nothing else is emitted for this run.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        let last = rig.controller.status().last_run.unwrap();
        assert_eq!(last.outcome, RunOutcome::Failed);
        assert_eq!(last.captured, 1);
        assert!(last.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn camera_down_rejects_synchronously_without_events() {
        let rig = rig(ScriptedCamera::down());
        let mut rx = rig.controller.subscribe();

        let err = rig.controller.start_run("10.0.0.5", 3).await.unwrap_err();
        assert!(matches!(err, ControlError::CameraUnavailable));
        assert_eq!(rig.controller.status().state, ControllerPhase::Idle);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(rig.line.pulses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_while_running_is_busy() {
        let rig = rig(ScriptedCamera::healthy());
        let mut rx = rig.controller.subscribe();

        rig.controller.start_run("10.0.0.5", 2).await.unwrap();
        let err = rig.controller.start_run("10.0.0.6", 1).await.unwrap_err();
        assert!(matches!(err, ControlError::Busy));
        // The busy check happens before the probe.
        assert_eq!(rig.camera.pings.load(Ordering::SeqCst), 1);

        drain_run(&mut rx).await;
        rig.controller.start_run("10.0.0.5", 1).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn simultaneous_starts_admit_exactly_one() {
        let rig = rig(ScriptedCamera::healthy());
        let a = rig.controller.clone();
        let b = rig.controller.clone();

        let (ra, rb) = tokio::join!(a.start_run("10.0.0.5", 1), b.start_run("10.0.0.5", 1));

        let accepted = [ra.is_ok(), rb.is_ok()];
        assert_eq!(accepted.iter().filter(|ok| **ok).count(), 1);
        assert!(matches!(
            ra.err().or(rb.err()),
            Some(ControlError::Busy)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_right_after_start_stops_within_one_slide() {
        let rig = rig(ScriptedCamera::healthy());
        let mut rx = rig.controller.subscribe();

        let accepted = rig.controller.start_run("10.0.0.5", 5).await.unwrap();
        assert_eq!(rig.controller.abort().unwrap(), accepted.run_id);
        assert!(rig.controller.status().active.unwrap().abort_requested);

        let events = drain_run(&mut rx).await;
        assert_eq!(events.last(), Some(&ProgressEvent::Aborted));
        assert!(events.len() <= 2);
        assert!(rig.line.pulses().len() <= 1);
        assert_eq!(rig.controller.status().state, ControllerPhase::Idle);
        assert_eq!(
            rig.controller.status().last_run.unwrap().outcome,
            RunOutcome::Aborted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abort_latency_is_bounded_by_one_slide_cycle() {
        let rig = rig(ScriptedCamera::healthy());
        let mut rx = rig.controller.subscribe();

        rig.controller.start_run("10.0.0.5", 5).await.unwrap();
        // Let slide 1 start, then abort mid-settle.
        assert_eq!(rx.recv().await.unwrap().event, in_progress(1, 5));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let asked = tokio::time::Instant::now();
        rig.controller.abort().unwrap();

        let events = drain_run(&mut rx).await;
        assert_eq!(events, vec![ProgressEvent::Aborted]);
        // pulse 250ms + settle 1.5s + transfer 2s
        assert!(asked.elapsed() <= Duration::from_millis(3750));
        assert_eq!(rig.camera.capture_times().len(), 1);
        assert!(!rig.line.is_high());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_while_idle_is_rejected_and_changes_nothing() {
        let rig = rig(ScriptedCamera::healthy());

        for _ in 0..3 {
            assert!(matches!(
                rig.controller.abort(),
                Err(ControlError::NothingToAbort)
            ));
        }
        assert_eq!(rig.controller.status().state, ControllerPhase::Idle);

        // A stale abort never leaks into the next run.
        let mut rx = rig.controller.subscribe();
        rig.controller.start_run("10.0.0.5", 1).await.unwrap();
        assert_eq!(
            drain_run(&mut rx).await,
            vec![in_progress(1, 1), ProgressEvent::Completed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abort_flag_is_cleared_for_the_next_run() {
        let rig = rig(ScriptedCamera::healthy());
        let mut rx = rig.controller.subscribe();

        rig.controller.start_run("10.0.0.5", 3).await.unwrap();
        rig.controller.abort().unwrap();
        drain_run(&mut rx).await;

        rig.controller.start_run("10.0.0.5", 2).await.unwrap();
        assert_eq!(
            drain_run(&mut rx).await,
            vec![in_progress(1, 2), in_progress(2, 2), ProgressEvent::Completed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reverse_while_running_is_busy_and_does_not_pulse() {
        let rig = rig(ScriptedCamera::healthy());
        let mut rx = rig.controller.subscribe();

        rig.controller.start_run("10.0.0.5", 2).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().event, in_progress(1, 2));
        let before = rig.line.pulses().len();

        assert!(matches!(
            rig.controller.reverse_one_slide().await,
            Err(ControlError::Busy)
        ));
        assert_eq!(rig.line.pulses().len(), before);
        assert!(rig
            .line
            .pulses()
            .iter()
            .all(|(_, held)| *held == Duration::from_millis(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn reverse_while_idle_pulses_and_blocks_until_done() {
        let rig = rig(ScriptedCamera::healthy());
        let start = tokio::time::Instant::now();

        rig.controller.reverse_one_slide().await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(750));
        let pulses = rig.line.pulses();
        assert_eq!(pulses.len(), 1);
        assert_eq!(pulses[0].1, Duration::from_millis(750));
        assert_eq!(rig.controller.status().state, ControllerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn start_during_reverse_is_busy() {
        let rig = rig(ScriptedCamera::healthy());
        let reversing = rig.controller.clone();
        let reverse = tokio::spawn(async move { reversing.reverse_one_slide().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(rig.controller.status().state, ControllerPhase::Reversing);
        assert!(matches!(
            rig.controller.start_run("10.0.0.5", 1).await,
            Err(ControlError::Busy)
        ));
        assert!(matches!(
            rig.controller.abort(),
            Err(ControlError::NothingToAbort)
        ));
        reverse.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_requests_are_rejected_before_probing() {
        let rig = rig(ScriptedCamera::healthy());

        assert!(matches!(
            rig.controller.start_run("10.0.0.5", 0).await,
            Err(ControlError::InvalidSlideCount { requested: 0, .. })
        ));
        assert!(matches!(
            rig.controller.start_run("10.0.0.5", 10_000).await,
            Err(ControlError::InvalidSlideCount { .. })
        ));
        assert!(matches!(
            rig.controller.start_run("http://evil/", 1).await,
            Err(ControlError::InvalidCamera(_))
        ));
        assert_eq!(rig.camera.pings.load(Ordering::SeqCst), 0);
        assert_eq!(rig.controller.status().state, ControllerPhase::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn terminal_frame_precedes_every_frame_of_the_next_run() {
        let cfg = ControllerConfig {
            advance_pulse: Duration::ZERO,
            settle_delay: Duration::ZERO,
            transfer_delay: Duration::ZERO,
            ..ControllerConfig::default()
        };
        let actuator =
            ActuatorDriver::initialize(SimulatedLine::new(), cfg.advance_pulse, cfg.reverse_pulse)
                .unwrap();
        let controller =
            RunController::new(&cfg, Arc::new(actuator), Arc::new(ScriptedCamera::healthy()));
        let mut rx = controller.subscribe();

        let first = controller.start_run("10.0.0.5", 1).await.unwrap();
        let second = loop {
            match controller.start_run("10.0.0.5", 1).await {
                Ok(accepted) => break accepted,
                Err(ControlError::Busy) => tokio::task::yield_now().await,
                Err(e) => panic!("unexpected rejection: {e}"),
            }
        };

        let mut frames = Vec::new();
        while frames.len() < 4 {
            let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            frames.push(frame);
        }
        let run_ids: Vec<_> = frames.iter().map(|f| f.run_id).collect();
        assert_eq!(
            run_ids,
            vec![first.run_id, first.run_id, second.run_id, second.run_id]
        );
        assert_eq!(frames[1].event, ProgressEvent::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_frame_is_observed_with_controller_idle() {
        let rig = rig(ScriptedCamera::healthy());
        let mut rx = rig.controller.subscribe();

        rig.controller.start_run("10.0.0.5", 1).await.unwrap();
        drain_run(&mut rx).await;

        assert_eq!(rig.controller.status().state, ControllerPhase::Idle);
        rig.controller.start_run("10.0.0.5", 1).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn actuator_fault_ends_run_and_trips_fatal_signal() {
        let cfg = ControllerConfig::default();
        let line = SimulatedLine::new();
        let actuator =
            ActuatorDriver::initialize(line.clone(), cfg.advance_pulse, cfg.reverse_pulse)
                .unwrap();
        let actuator = Arc::new(actuator);
        actuator.release();
        let controller = RunController::new(
            &cfg,
            actuator,
            Arc::new(ScriptedCamera::healthy()),
        );
        let fatal = controller.fatal_signal();
        let mut rx = controller.subscribe();

        controller.start_run("10.0.0.5", 3).await.unwrap();
        let events = drain_run(&mut rx).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ProgressEvent::Error { .. }));
        assert!(fatal.is_cancelled());
        assert_eq!(controller.status().state, ControllerPhase::Idle);
    }
}
