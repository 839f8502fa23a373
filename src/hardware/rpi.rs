use anyhow::{Context, Result};
use rppal::gpio::{Gpio, OutputPin};

/// Claim a BCM pin as an output, starting LOW so the relay is off.
pub fn open_relay_line(bcm_pin: u8) -> Result<OutputPin> {
    let gpio = Gpio::new().context("failed to open GPIO peripheral")?;
    let mut line = gpio
        .get(bcm_pin)
        .with_context(|| format!("failed to claim GPIO pin {bcm_pin}"))?
        .into_output_low();
    // The driver returns the line to rest itself; rppal would otherwise reset the pin mode.
    line.set_reset_on_drop(false);
    Ok(line)
}
