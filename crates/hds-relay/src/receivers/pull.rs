//! WebSocket pull receiver
//!
//! Keeps an outbound connection to another relay's `/ws` stream and replays
//! every `{data, updatedKey}` frame into the local exporters. Dropped
//! connections are retried forever with exponential backoff.

use futures::StreamExt;
use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, Message};

use hds_relay_core::{Backoff, ExporterSet, HealthRecord, UpdateMessage};

#[derive(Debug, Error)]
pub enum PullError {
    #[error("dialing websocket server: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("reading websocket: {0}")]
    Read(#[source] tungstenite::Error),

    #[error("decoding websocket message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Summary of a session that ended cleanly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Frames dispatched to the exporters
    pub messages: usize,
}

/// Ingestion transport reading from a remote broadcast stream
pub struct PullReceiver {
    exporters: ExporterSet,
    url: String,
    backoff: Backoff,
    record: HealthRecord,
    sessions: u64,
}

impl PullReceiver {
    pub fn new(exporters: ExporterSet, url: impl Into<String>, backoff: Backoff) -> Self {
        Self {
            exporters,
            url: url.into(),
            backoff,
            record: HealthRecord::new(),
            sessions: 0,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Record as of the last received frame
    pub fn record(&self) -> &HealthRecord {
        &self.record
    }

    /// Connection attempts made so far
    pub fn sessions(&self) -> u64 {
        self.sessions
    }

    /// One connect-and-read cycle.
    ///
    /// A close frame or end of stream is a clean end. Any connect, read or
    /// decode failure is returned as an error.
    pub async fn session(&mut self) -> Result<SessionOutcome, PullError> {
        self.sessions += 1;
        let (mut stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(PullError::Connect)?;

        tracing::info!(url = %self.url, "WebSocket connected, now receiving messages...");
        let mut outcome = SessionOutcome::default();

        while let Some(frame) = stream.next().await {
            let payload = match frame {
                Ok(Message::Text(text)) => text.into_bytes(),
                Ok(Message::Binary(bytes)) => bytes,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed) => break,
                Err(e) => return Err(PullError::Read(e)),
            };

            let message: UpdateMessage = serde_json::from_slice(&payload)?;
            tracing::debug!(updated_key = %message.updated_key, "Received msg");

            self.record = message.data;
            self.exporters.dispatch(&self.record, &message.updated_key);
            outcome.messages += 1;
        }

        Ok(outcome)
    }

    /// Run sessions forever, sleeping between them per the backoff policy
    pub async fn run(mut self) {
        tracing::info!(url = %self.url, "Pull receiver starting");
        loop {
            let wait = match self.session().await {
                Ok(outcome) => {
                    let wait = self.backoff.after_clean_session();
                    tracing::info!(
                        messages = outcome.messages,
                        duration = ?wait,
                        "Reconnecting in"
                    );
                    wait
                }
                Err(e) => {
                    tracing::error!(error = %e, "WebSocket connection");
                    let wait = self.backoff.after_failed_session();
                    tracing::error!(duration = ?wait, "Reconnecting in");
                    wait
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}
