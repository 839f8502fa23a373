//! Camera-control capability and its DigiCamControl web-service client.

use crate::error::CameraError;
use crate::model::{CameraTarget, ControllerConfig};
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;

/// Remote camera operations used by a capture run.
#[async_trait]
pub trait CameraControl: Send + Sync {
    /// `true` only if the service answered successfully within the probe timeout.
    async fn ping(&self, target: &CameraTarget) -> bool;
    /// Trigger one capture. Any failure ends the run; there is no retry.
    async fn capture(&self, target: &CameraTarget) -> Result<(), CameraError>;
}

/// HTTP client for the DigiCamControl web service (`http://<host>:<port>/?CMD=...`).
#[derive(Clone)]
pub struct DigiCamClient {
    http: reqwest::Client,
    port: u16,
    probe_timeout: Duration,
    capture_timeout: Duration,
}

impl DigiCamClient {
    pub fn new(cfg: &ControllerConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(cfg.probe_timeout)
            .build()?;
        Ok(Self {
            http,
            port: cfg.camera_port,
            probe_timeout: cfg.probe_timeout,
            capture_timeout: cfg.capture_timeout,
        })
    }

    fn command_url(&self, target: &CameraTarget, cmd: &str) -> Result<Url, CameraError> {
        let mut url = Url::parse(&format!("http://{}:{}/", target.host(), self.port))
            .map_err(|_| CameraError::InvalidAddress(target.to_string()))?;
        url.query_pairs_mut().append_pair("CMD", cmd);
        Ok(url)
    }
}

#[async_trait]
impl CameraControl for DigiCamClient {
    async fn ping(&self, target: &CameraTarget) -> bool {
        let url = match self.command_url(target, "Ping") {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "Error checking DigiCamControl availability");
                return false;
            }
        };
        tracing::info!(%url, "Checking availability of DigiCamControl");
        match self.http.get(url).timeout(self.probe_timeout).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("DigiCamControl is available.");
                true
            }
            Ok(resp) => {
                tracing::warn!(
                    status = resp.status().as_u16(),
                    "DigiCamControl returned unexpected status"
                );
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Error checking DigiCamControl availability");
                false
            }
        }
    }

    async fn capture(&self, target: &CameraTarget) -> Result<(), CameraError> {
        let url = self.command_url(target, "Capture")?;
        tracing::info!(%url, "Capturing image using DigiCamControl");
        let resp = self
            .http
            .post(url)
            .timeout(self.capture_timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CameraError::Status(status.as_u16()));
        }
        tracing::info!("Image captured successfully.");
        Ok(())
    }
}
