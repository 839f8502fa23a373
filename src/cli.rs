use crate::engine::{ActuatorDriver, DigiCamClient};
use crate::hardware::SimulatedLine;
use crate::model::ControllerConfig;
use crate::orchestrator::RunController;
use anyhow::{Context, Result};
use clap::Parser;
use embedded_hal::digital::OutputPin;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "slide-capture",
    version,
    about = "Advance a slide projector and trigger a DigiCamControl capture for every slide"
)]
pub struct Cli {
    /// Address the HTTP API listens on
    #[arg(long, env = "SLIDE_CAPTURE_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Port of the DigiCamControl web service on the camera host
    #[arg(long, env = "SLIDE_CAPTURE_CAMERA_PORT", default_value_t = 5513)]
    pub camera_port: u16,

    /// BCM number of the GPIO pin driving the advance relay
    #[arg(long, env = "SLIDE_CAPTURE_RELAY_PIN", default_value_t = 2)]
    pub relay_pin: u8,

    /// Drive a simulated relay line instead of GPIO hardware
    #[arg(long, env = "SLIDE_CAPTURE_SIMULATE")]
    pub simulate: bool,

    /// How long the relay is held to advance one slide
    #[arg(long, env = "SLIDE_CAPTURE_ADVANCE_PULSE", default_value = "250ms")]
    pub advance_pulse: humantime::Duration,

    /// How long the relay is held to reverse one slide
    #[arg(long, env = "SLIDE_CAPTURE_REVERSE_PULSE", default_value = "750ms")]
    pub reverse_pulse: humantime::Duration,

    /// Wait after advancing before the capture is triggered
    #[arg(long, env = "SLIDE_CAPTURE_SETTLE_DELAY", default_value = "1500ms")]
    pub settle_delay: humantime::Duration,

    /// Wait after a capture for the image to transfer off the camera
    #[arg(long, env = "SLIDE_CAPTURE_TRANSFER_DELAY", default_value = "2s")]
    pub transfer_delay: humantime::Duration,

    /// Camera availability probe timeout
    #[arg(long, env = "SLIDE_CAPTURE_PROBE_TIMEOUT", default_value = "5s")]
    pub probe_timeout: humantime::Duration,

    /// Capture request timeout
    #[arg(long, env = "SLIDE_CAPTURE_CAPTURE_TIMEOUT", default_value = "30s")]
    pub capture_timeout: humantime::Duration,

    /// Largest slide count accepted for one run
    #[arg(long, env = "SLIDE_CAPTURE_MAX_SLIDES", default_value_t = 140)]
    pub max_slides: u32,
}

/// Build a `ControllerConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> ControllerConfig {
    ControllerConfig {
        listen: args.listen,
        camera_port: args.camera_port,
        relay_pin: args.relay_pin,
        simulate: args.simulate || cfg!(not(feature = "rpi")),
        advance_pulse: Duration::from(args.advance_pulse),
        reverse_pulse: Duration::from(args.reverse_pulse),
        settle_delay: Duration::from(args.settle_delay),
        transfer_delay: Duration::from(args.transfer_delay),
        probe_timeout: Duration::from(args.probe_timeout),
        capture_timeout: Duration::from(args.capture_timeout),
        max_slides: args.max_slides,
        user_agent: format!("slide-capture/{}", env!("CARGO_PKG_VERSION")),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    if cfg.simulate && !args.simulate {
        tracing::warn!("built without the `rpi` feature; using a simulated relay line");
    }

    if cfg.simulate {
        return serve(cfg, SimulatedLine::new()).await;
    }
    serve_gpio(cfg).await
}

#[cfg(feature = "rpi")]
async fn serve_gpio(cfg: ControllerConfig) -> Result<()> {
    let line = crate::hardware::open_relay_line(cfg.relay_pin)?;
    serve(cfg, line).await
}

#[cfg(not(feature = "rpi"))]
async fn serve_gpio(_cfg: ControllerConfig) -> Result<()> {
    anyhow::bail!("GPIO output requires building with the `rpi` feature")
}

/// Serve the HTTP API until shutdown, keeping the relay line owned for the whole time.
async fn serve<P>(cfg: ControllerConfig, line: P) -> Result<()>
where
    P: OutputPin + Send + 'static,
{
    let actuator = Arc::new(
        ActuatorDriver::initialize(line, cfg.advance_pulse, cfg.reverse_pulse)
            .context("failed to initialize relay line")?,
    );
    let camera = Arc::new(DigiCamClient::new(&cfg).context("failed to build camera client")?);
    let controller = RunController::new(&cfg, actuator.clone(), camera);
    let fatal = controller.fatal_signal();
    let shutdown = controller.shutdown_signal();

    let release = release_on_shutdown(actuator.clone(), fatal.clone(), shutdown.clone());

    let listener = tokio::net::TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;
    tracing::info!(
        listen = %cfg.listen,
        relay_pin = cfg.relay_pin,
        simulate = cfg.simulate,
        config = %describe_config(&cfg)?,
        "Starting slide capture service"
    );

    let served = axum::serve(listener, crate::server::router(controller))
        .with_graceful_shutdown(shutdown_signal(fatal, shutdown.clone()))
        .await;

    shutdown.cancel();
    let faulted = release.await.context("relay release task failed")?;
    served.context("HTTP server failed")?;
    if faulted {
        anyhow::bail!("stopped after a projector actuator fault");
    }
    Ok(())
}

/// Rest the line as soon as shutdown begins. Resolves to whether an actuator fault had
/// already tripped `fatal` at that moment; a run still in flight fails its next pulse
/// against the released line afterwards, and that does not count as a fault.
fn release_on_shutdown<P>(
    actuator: Arc<ActuatorDriver<P>>,
    fatal: CancellationToken,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<bool>
where
    P: OutputPin + Send + 'static,
{
    tokio::spawn(async move {
        shutdown.cancelled().await;
        let faulted = fatal.is_cancelled();
        actuator.release();
        faulted
    })
}

/// Effective configuration as JSON, durations in humantime form.
fn describe_config(cfg: &ControllerConfig) -> Result<String> {
    serde_json::to_string(cfg).context("failed to encode configuration")
}

/// Resolves on Ctrl-C, SIGTERM or an actuator fault, and cancels `shutdown` so open
/// event streams end.
async fn shutdown_signal(fatal: CancellationToken, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl-C received, shutting down"),
        _ = terminate => tracing::info!("SIGTERM received, shutting down"),
        _ = fatal.cancelled() => tracing::error!("actuator fault, shutting down"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
