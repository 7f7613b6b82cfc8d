//! Terminal front end: every stdin line becomes an inbound message and every
//! reply is printed back.

use async_trait::async_trait;
use herald_core::{ContextId, DeliveryError, Dispatcher, InboundMessage, ResponseSink, UserId};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Writes replies to any async writer, one per line.
pub struct ConsoleSink<W> {
    out: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ResponseSink for ConsoleSink<W> {
    async fn respond(&self, to: &InboundMessage, text: &str) -> Result<(), DeliveryError> {
        let mut out = self.out.lock().await;
        let failed = |e: std::io::Error| match e.kind() {
            std::io::ErrorKind::BrokenPipe => DeliveryError::Closed,
            _ => DeliveryError::Failed {
                message_id: to.id.to_string(),
                message: e.to_string(),
            },
        };
        out.write_all(text.as_bytes()).await.map_err(failed)?;
        out.write_all(b"\n").await.map_err(failed)?;
        out.flush().await.map_err(failed)
    }
}

/// Who is typing at the console.
#[derive(Debug, Clone)]
pub struct Session {
    pub context: ContextId,
    pub user_id: UserId,
}

/// Dispatch every line of `input` until it ends. Returns the number of
/// lines that ran a command to completion.
pub async fn run_lines<R>(dispatcher: &Dispatcher, session: &Session, input: R) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut completed = 0;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read console input");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = InboundMessage::new(session.context.clone(), session.user_id, line);
        match dispatcher.dispatch(&message).await {
            Ok(outcome) if outcome.is_completed() => completed += 1,
            Ok(outcome) => debug!(?outcome, "Line not completed"),
            // The offending line is dropped; the console keeps reading.
            Err(e) => error!(error = %e, "Dispatch failed"),
        }
    }
    info!(completed, "Console input closed");
    completed
}
