//! Server-Sent Events stream of a job's log.
//!
//! Each log line is sent as a `log` event; a final `done` event closes the
//! stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use tracing::debug;

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::jobs::LOG_SENTINEL;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// GET /api/logs/{id} - SSE stream of a job's log lines.
pub async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // 404 before the stream starts.
    state.manager.status(&id)?;

    let manager = state.manager.clone();
    let poll_interval = state.log_poll_interval;
    debug!(job_id = %id, "SSE client connected to job log");

    let stream = async_stream::stream! {
        let mut cursor = 0;

        loop {
            // Status first: if it is already terminal, the tail below holds
            // every line written before that update.
            let terminal = match manager.status(&id) {
                Ok(record) => record.status.is_terminal(),
                Err(_) => break,
            };
            let (lines, next) = match manager.tail_logs(&id, cursor) {
                Ok(tail) => tail,
                Err(_) => break,
            };
            cursor = next;

            let nothing_new = lines.is_empty();
            let mut finished = false;
            for line in lines {
                if line.is_sentinel() {
                    finished = true;
                    break;
                }
                yield Ok(Event::default().event("log").data(line.render()));
            }

            if finished || (terminal && nothing_new) {
                yield Ok(Event::default().event("done").data(LOG_SENTINEL));
                break;
            }

            tokio::time::sleep(poll_interval).await;
        }

        debug!(job_id = %id, "SSE log stream finished");
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    ))
}
