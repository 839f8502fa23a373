use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;
use crate::model::StatusSnapshot;
use crate::orchestrator::{RunAccepted, RunController};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub reason: &'static str,
}

/// HTTP shape of a rejected controller operation.
#[derive(Debug)]
pub struct ControlHttpError(ControlError);

impl From<ControlError> for ControlHttpError {
    fn from(error: ControlError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ControlHttpError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.0.to_string(),
            reason: self.0.reason(),
        });
        (self.0.status_code(), body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub camera: String,
    pub slides: u32,
}

#[derive(Debug, Serialize)]
pub struct RunStartedResponse {
    pub message: &'static str,
    pub run_id: u64,
    pub capture_count: u32,
    pub camera: String,
}

impl From<RunAccepted> for RunStartedResponse {
    fn from(accepted: RunAccepted) -> Self {
        Self {
            message: "Capture process started successfully.",
            run_id: accepted.run_id,
            capture_count: accepted.slide_count,
            camera: accepted.camera.to_string(),
        }
    }
}

/// Response of the `/advance` route, keeping the key its existing clients read.
#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    #[serde(flatten)]
    pub started: RunStartedResponse,
    pub digicamcontroler_ip: String,
}

impl From<RunAccepted> for AdvanceResponse {
    fn from(accepted: RunAccepted) -> Self {
        let digicamcontroler_ip = accepted.camera.to_string();
        Self {
            started: accepted.into(),
            digicamcontroler_ip,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AbortResponse {
    pub message: &'static str,
    pub run_id: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub async fn advance_handler(
    State(controller): State<RunController>,
    path: Result<Path<(String, u32)>, PathRejection>,
) -> Result<Json<AdvanceResponse>, ControlHttpError> {
    let Path((camera, count)) =
        path.map_err(|rejection| ControlError::MalformedRequest(rejection.body_text()))?;
    let accepted = controller.start_run(&camera, count).await?;
    Ok(Json(accepted.into()))
}

pub async fn start_run_handler(
    State(controller): State<RunController>,
    body: Result<Json<StartRunRequest>, JsonRejection>,
) -> Result<Json<RunStartedResponse>, ControlHttpError> {
    let Json(request) =
        body.map_err(|rejection| ControlError::MalformedRequest(rejection.body_text()))?;
    let accepted = controller
        .start_run(&request.camera, request.slides)
        .await?;
    Ok(Json(accepted.into()))
}

pub async fn abort_handler(
    State(controller): State<RunController>,
) -> Result<Json<AbortResponse>, ControlHttpError> {
    let run_id = controller.abort()?;
    Ok(Json(AbortResponse {
        message: "Abort requested.",
        run_id,
    }))
}

pub async fn reverse_handler(
    State(controller): State<RunController>,
) -> Result<Json<MessageResponse>, ControlHttpError> {
    controller.reverse_one_slide().await?;
    Ok(Json(MessageResponse {
        message: "Reversed one slide.",
    }))
}

pub async fn status_handler(State(controller): State<RunController>) -> Json<StatusSnapshot> {
    Json(controller.status())
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(MessageResponse { message: "ok" }))
}
