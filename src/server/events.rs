use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use std::{convert::Infallible, time::Duration};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::model::ProgressFrame;
use crate::orchestrator::RunController;

/// Live progress as Server-Sent Events. No replay: a new observer starts at the next frame.
///
/// The stream ends when the service begins shutting down so graceful shutdown can finish.
pub async fn progress_sse_handler(
    State(controller): State<RunController>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(controller.subscribe())
        .map(|item| Ok(to_event(item)))
        .take_until(controller.shutdown_signal().cancelled_owned());
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(item: Result<ProgressFrame, BroadcastStreamRecvError>) -> Event {
    match item {
        Ok(frame) => {
            let event = Event::default()
                .event(frame.event.kind())
                .id(format!("{}-{}", frame.run_id, frame.sequence));
            match event.json_data(&frame) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode progress frame");
                    Event::default().event("encode_error").data(e.to_string())
                }
            }
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "progress observer lagged");
            Event::default()
                .event("lagged")
                .data(format!("{{\"skipped\":{skipped}}}"))
        }
    }
}
