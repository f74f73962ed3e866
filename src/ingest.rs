//! Event intake: a TCP listener speaking newline-delimited JSON.
//!
//! The log shipper connects, writes one `HoneypotEvent` per line, and
//! reads one `EnrichedEvent` per line back. Malformed lines produce a
//! structured error line -- an event is never dropped without a response.

use std::sync::Arc;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};

use crate::engine::CorrelationEngine;
use crate::event::HoneypotEvent;

/// Cap on one intake line; honeypot events are small.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accept loop. Runs until the listener fails.
pub async fn run_intake(bind: &str, engine: Arc<CorrelationEngine>) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(%bind, "event intake listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "intake connection");

        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, engine).await {
                warn!(%peer, error = %e, "intake connection closed with error");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, engine: Arc<CorrelationEngine>) -> Result<()> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

    while let Some(line) = framed.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<HoneypotEvent>(&line) {
            Ok(event) => {
                // The pipeline is synchronous (locks + a SQLite write);
                // keep it off the reactor threads.
                let engine = engine.clone();
                let enriched =
                    tokio::task::spawn_blocking(move || engine.process(event)).await?;
                serde_json::to_string(&enriched)?
            }
            Err(e) => {
                warn!(error = %e, "unparseable intake line");
                serde_json::json!({
                    "error": "unparseable event",
                    "detail": e.to_string(),
                })
                .to_string()
            }
        };

        if let Err(e) = framed.send(response).await {
            error!(error = %e, "failed to write intake response");
            break;
        }
    }

    Ok(())
}
