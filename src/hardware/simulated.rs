use embedded_hal::digital::{ErrorKind, ErrorType, OutputPin};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;

/// Level changes kept for inspection; older ones are dropped.
const TRANSITION_HISTORY: usize = 256;

/// An in-memory relay line that logs every level change and keeps the most recent ones.
///
/// Used when no GPIO hardware is available (`--simulate`) and by tests.
#[derive(Debug, Clone, Default)]
pub struct SimulatedLine {
    inner: Arc<Mutex<LineLog>>,
}

#[derive(Debug, Default)]
struct LineLog {
    high: bool,
    fail_writes: bool,
    transitions: VecDeque<(Instant, bool)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedLineError;

impl embedded_hal::digital::Error for SimulatedLineError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl SimulatedLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A line whose every write fails, for exercising actuator faults.
    #[cfg(test)]
    pub fn failing() -> Self {
        let line = Self::default();
        line.log().fail_writes = true;
        line
    }

    #[cfg(test)]
    pub fn is_high(&self) -> bool {
        self.log().high
    }

    /// Completed pulses within the kept history, as (rising edge, time held high).
    #[cfg(test)]
    pub fn pulses(&self) -> Vec<(Instant, std::time::Duration)> {
        let log = self.log();
        let mut pulses = Vec::new();
        let mut rose_at = None;
        for &(at, high) in &log.transitions {
            match (high, rose_at) {
                (true, None) => rose_at = Some(at),
                (false, Some(start)) => {
                    pulses.push((start, at - start));
                    rose_at = None;
                }
                _ => {}
            }
        }
        pulses
    }

    fn log(&self) -> std::sync::MutexGuard<'_, LineLog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&mut self, high: bool) -> Result<(), SimulatedLineError> {
        let mut log = self.log();
        if log.fail_writes {
            return Err(SimulatedLineError);
        }
        if log.high != high {
            tracing::debug!(level = if high { "HIGH" } else { "LOW" }, "simulated relay line");
            if log.transitions.len() == TRANSITION_HISTORY {
                log.transitions.pop_front();
            }
            log.transitions.push_back((Instant::now(), high));
        }
        log.high = high;
        Ok(())
    }
}

impl ErrorType for SimulatedLine {
    type Error = SimulatedLineError;
}

impl OutputPin for SimulatedLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn repeated_levels_do_not_record_transitions() {
        let mut line = SimulatedLine::new();
        line.set_low().unwrap();
        line.set_high().unwrap();
        line.set_high().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        line.set_low().unwrap();

        let pulses = line.pulses();
        assert_eq!(pulses.len(), 1);
        assert_eq!(pulses[0].1, Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn history_stays_bounded_over_many_pulses() {
        let mut line = SimulatedLine::new();
        for _ in 0..1_000 {
            line.set_high().unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            line.set_low().unwrap();
        }

        assert_eq!(line.log().transitions.len(), TRANSITION_HISTORY);
        let pulses = line.pulses();
        assert_eq!(pulses.len(), TRANSITION_HISTORY / 2);
        assert!(pulses.iter().all(|(_, held)| *held == Duration::from_millis(10)));
    }
}
