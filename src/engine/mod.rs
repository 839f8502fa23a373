mod actuator;
mod camera;

pub use actuator::{Actuator, ActuatorDriver};
pub use camera::{CameraControl, DigiCamClient};

use crate::error::{ActuatorFault, CameraError};
use crate::model::{ControllerConfig, RunRequest};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

/// Receives the per-slide milestone of a running sequence.
pub trait ProgressSink: Send + Sync {
    fn slide_advanced(&self, current_slide: u32, total_slides: u32);
}

/// Why a sequence stopped.
#[derive(Debug)]
pub enum SequenceEnd {
    Completed,
    Aborted,
    CaptureFailed(CameraError),
    ActuatorFault(ActuatorFault),
}

#[derive(Debug)]
pub struct SequenceReport {
    pub end: SequenceEnd,
    /// Slides whose capture succeeded.
    pub captured: u32,
}

/// Fixed waits around each capture. The projector and camera give no completion signal.
#[derive(Debug, Clone, Copy)]
pub struct SequenceTiming {
    pub settle_delay: Duration,
    pub transfer_delay: Duration,
}

impl From<&ControllerConfig> for SequenceTiming {
    fn from(cfg: &ControllerConfig) -> Self {
        Self {
            settle_delay: cfg.settle_delay,
            transfer_delay: cfg.transfer_delay,
        }
    }
}

pub struct SlideSequence {
    request: RunRequest,
    timing: SequenceTiming,
}

impl SlideSequence {
    pub fn new(request: RunRequest, timing: SequenceTiming) -> Self {
        Self { request, timing }
    }

    /// Advance and capture each slide in order.
    ///
    /// `abort` is checked once at the top of every slide; a slide that has started is
    /// always carried through its capture and transfer wait.
    pub async fn run(
        self,
        actuator: Arc<dyn Actuator>,
        camera: Arc<dyn CameraControl>,
        progress: Arc<dyn ProgressSink>,
        abort: Arc<AtomicBool>,
    ) -> SequenceReport {
        let total = self.request.slide_count;
        let target = &self.request.camera;
        let mut captured = 0u32;

        for slide in 1..=total {
            if abort.load(Ordering::SeqCst) {
                tracing::warn!(slide, total, "abort observed, stopping before next advance");
                return SequenceReport {
                    end: SequenceEnd::Aborted,
                    captured,
                };
            }

            tracing::info!("Advancing slide {slide} of {total}");
            if let Err(fault) = actuator.pulse_advance().await {
                return SequenceReport {
                    end: SequenceEnd::ActuatorFault(fault),
                    captured,
                };
            }
            progress.slide_advanced(slide, total);

            tokio::time::sleep(self.timing.settle_delay).await;

            if let Err(e) = camera.capture(target).await {
                tracing::error!(slide, error = %e, "Error capturing image");
                return SequenceReport {
                    end: SequenceEnd::CaptureFailed(e),
                    captured,
                };
            }
            captured += 1;

            tokio::time::sleep(self.timing.transfer_delay).await;
        }

        tracing::info!(total, "Slide capturing process completed.");
        SequenceReport {
            end: SequenceEnd::Completed,
            captured,
        }
    }
}
