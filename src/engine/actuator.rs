//! Timed pulses on the projector's advance line.
//!
//! The driver owns the output line for the lifetime of the process. It drives the
//! line to rest when created, when [`ActuatorDriver::release`] is called and when it
//! is dropped, so every exit path (including unwinding) leaves the relay open.

use crate::error::ActuatorFault;
use async_trait::async_trait;
use embedded_hal::digital::OutputPin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Pulse primitives consumed by the run controller.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Hold the advance state for the configured duration, then release.
    async fn pulse_advance(&self) -> Result<(), ActuatorFault>;
    /// Hold the reverse state for the configured duration, then release.
    async fn pulse_reverse(&self) -> Result<(), ActuatorFault>;
}

#[derive(Debug)]
pub struct ActuatorDriver<P: OutputPin> {
    line: Mutex<P>,
    pulse_lock: tokio::sync::Mutex<()>,
    released: AtomicBool,
    advance_pulse: Duration,
    reverse_pulse: Duration,
}

impl<P> ActuatorDriver<P>
where
    P: OutputPin + Send,
{
    /// Take ownership of the line and put it at rest.
    pub fn initialize(
        mut line: P,
        advance_pulse: Duration,
        reverse_pulse: Duration,
    ) -> Result<Self, ActuatorFault> {
        line.set_low().map_err(write_fault)?;
        tracing::info!(
            advance_ms = advance_pulse.as_millis() as u64,
            reverse_ms = reverse_pulse.as_millis() as u64,
            "actuator line initialized at rest"
        );
        Ok(Self {
            line: Mutex::new(line),
            pulse_lock: tokio::sync::Mutex::new(()),
            released: AtomicBool::new(false),
            advance_pulse,
            reverse_pulse,
        })
    }

    /// Drive the line to rest and refuse any further pulses.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Cleaning up GPIO settings...");
        if let Err(fault) = self.set_level(false) {
            tracing::error!(%fault, "failed to return actuator line to rest");
        }
    }

    fn set_level(&self, high: bool) -> Result<(), ActuatorFault> {
        let mut line = self
            .line
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if high {
            line.set_high().map_err(write_fault)
        } else {
            line.set_low().map_err(write_fault)
        }
    }

    async fn pulse(&self, hold: Duration) -> Result<(), ActuatorFault> {
        // Pulses never overlap on the shared line.
        let _pulse = self.pulse_lock.lock().await;
        if self.released.load(Ordering::SeqCst) {
            return Err(ActuatorFault::Released);
        }

        tracing::debug!("Setting GPIO HIGH to activate relay.");
        self.set_level(true)?;
        let _rest = RestOnDrop(self);
        tokio::time::sleep(hold).await;
        tracing::debug!("Setting GPIO LOW to deactivate relay.");
        Ok(())
    }
}

/// Returns the line to rest when a pulse ends, including when its future is dropped mid-hold.
struct RestOnDrop<'a, P: OutputPin + Send>(&'a ActuatorDriver<P>);

impl<P: OutputPin + Send> Drop for RestOnDrop<'_, P> {
    fn drop(&mut self) {
        if let Err(fault) = self.0.set_level(false) {
            tracing::error!(%fault, "failed to end actuator pulse");
        }
    }
}

#[async_trait]
impl<P> Actuator for ActuatorDriver<P>
where
    P: OutputPin + Send,
{
    async fn pulse_advance(&self) -> Result<(), ActuatorFault> {
        self.pulse(self.advance_pulse).await
    }

    async fn pulse_reverse(&self) -> Result<(), ActuatorFault> {
        self.pulse(self.reverse_pulse).await
    }
}

impl<P: OutputPin> Drop for ActuatorDriver<P> {
    fn drop(&mut self) {
        let line = self
            .line
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = line.set_low();
    }
}

fn write_fault<E: core::fmt::Debug>(err: E) -> ActuatorFault {
    ActuatorFault::Write(format!("{err:?}"))
}
