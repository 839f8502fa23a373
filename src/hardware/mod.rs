//! Output line backends for the projector relay.
//!
//! Both backends implement [`embedded_hal::digital::OutputPin`], which is the only
//! surface the actuator driver depends on.

mod simulated;
#[cfg(feature = "rpi")]
mod rpi;

pub use simulated::SimulatedLine;
#[cfg(feature = "rpi")]
pub use rpi::open_relay_line;
