//! Transcript reconciliation against the platform's remote store.
//!
//! Messages are durable locally first and owed to the mirror afterwards:
//! an insert starts `pending`, a refused mirror write leaves it `unsynced`,
//! and this service re-drives both until the mirror accepts. The local row
//! is the UI's source of truth throughout and is never rolled back.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use db::{
    DBService,
    models::chat_message::{ChatMessage, SyncStatus},
};
use reqwest::Client;
use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Error)]
pub enum MirrorError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("mirror refused message: http {status}")]
    Rejected { status: u16 },
}

#[async_trait]
pub trait TranscriptMirror: Send + Sync {
    /// Offer one message to the remote store. Must tolerate replays: the
    /// message id is the dedup key.
    async fn mirror(&self, message: &ChatMessage) -> Result<(), MirrorError>;
}

/// Mirror for deployments without a remote store; accepts everything.
pub struct NullTranscriptMirror;

#[async_trait]
impl TranscriptMirror for NullTranscriptMirror {
    async fn mirror(&self, _message: &ChatMessage) -> Result<(), MirrorError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpTranscriptMirror {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTranscriptMirror {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, MirrorError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("fabrica/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MirrorError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl TranscriptMirror for HttpTranscriptMirror {
    async fn mirror(&self, message: &ChatMessage) -> Result<(), MirrorError> {
        let url = format!(
            "{}/v1/products/{}/messages",
            self.base_url, message.product_id
        );
        let mut request = self.http.post(url).json(message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request
            .send()
            .await
            .map_err(|e| MirrorError::Transport(e.to_string()))?;

        if res.status().is_success() {
            Ok(())
        } else {
            Err(MirrorError::Rejected {
                status: res.status().as_u16(),
            })
        }
    }
}

/// Background service that re-drives unreconciled transcript rows.
pub struct TranscriptOutboxService {
    db: DBService,
    mirror: Arc<dyn TranscriptMirror>,
    poll_interval: Duration,
}

impl TranscriptOutboxService {
    const BATCH_SIZE: i64 = 50;

    pub fn new(db: DBService, mirror: Arc<dyn TranscriptMirror>, poll_interval: Duration) -> Self {
        Self {
            db,
            mirror,
            poll_interval,
        }
    }

    /// Spawn the background outbox loop.
    pub async fn spawn(
        db: DBService,
        mirror: Arc<dyn TranscriptMirror>,
        poll_interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let service = Self::new(db, mirror, poll_interval);
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting transcript outbox service with interval {:?}",
            self.poll_interval
        );

        let mut interval = interval(self.poll_interval);

        loop {
            interval.tick().await;
            if let Err(e) = self.drain_once().await {
                error!("Error draining transcript outbox: {}", e);
            }
        }
    }

    /// One pass over the oldest unreconciled rows. Replay is in transcript
    /// order so the mirror converges to the local ordering.
    pub async fn drain_once(&self) -> Result<usize, sqlx::Error> {
        let owed = ChatMessage::find_unreconciled(&self.db.pool, Self::BATCH_SIZE).await?;
        if owed.is_empty() {
            debug!("transcript outbox: nothing to reconcile");
            return Ok(0);
        }

        let mut synced = 0;
        for message in owed {
            match self.mirror.mirror(&message).await {
                Ok(()) => {
                    ChatMessage::set_sync_status(&self.db.pool, message.id, SyncStatus::Synced)
                        .await?;
                    synced += 1;
                }
                Err(e) => {
                    warn!(
                        message_id = %message.id,
                        product_id = %message.product_id,
                        error = %e,
                        "transcript mirror refused message, will retry"
                    );
                    ChatMessage::set_sync_status(&self.db.pool, message.id, SyncStatus::Unsynced)
                        .await?;
                }
            }
        }

        Ok(synced)
    }
}
