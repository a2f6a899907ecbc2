//! Storage backend connection check.
//!
//! The relay keeps no data, but deployments configure a database connection string and expect
//! the process to report whether the backend is usable. At startup a background task connects
//! with the MongoDB driver and runs `ping` against the `admin` database, retrying with a fixed
//! delay until it succeeds.

use crate::config::StorageConfig;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// State of the configured backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageStatus {
    /// No connection string configured.
    Disabled,
    Connecting,
    Connected,
    /// `maxAttempts` exhausted.
    Unreachable,
}

/// Process-wide handle shared through gateway state. Read-only for request handlers.
#[derive(Clone)]
pub struct StorageHandle {
    status: Arc<RwLock<StorageStatus>>,
}

impl StorageHandle {
    pub fn new(initial: StorageStatus) -> Self {
        Self {
            status: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn disabled() -> Self {
        Self::new(StorageStatus::Disabled)
    }

    pub async fn status(&self) -> StorageStatus {
        *self.status.read().await
    }

    async fn set(&self, status: StorageStatus) {
        *self.status.write().await = status;
    }
}

/// Connect to `uri` and run `{ ping: 1 }` on `admin`. `timeout` bounds server selection and the
/// TCP connect so one attempt cannot hang past the retry delay for long.
pub async fn ping(uri: &str, timeout: Duration) -> Result<(), mongodb::error::Error> {
    let mut options = ClientOptions::parse(uri).await?;
    options.app_name.get_or_insert_with(|| "docrelay".to_string());
    options.server_selection_timeout = Some(timeout);
    options.connect_timeout = Some(timeout);
    let client = Client::with_options(options)?;
    client.database("admin").run_command(doc! { "ping": 1 }).await?;
    Ok(())
}

/// Run `attempt` until it succeeds or `max_attempts` (0 = unlimited) is reached, sleeping `delay`
/// between tries. Records the result on `handle`.
pub async fn connect_with_retry<F, Fut, E>(
    mut attempt: F,
    delay: Duration,
    max_attempts: u32,
    handle: &StorageHandle,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut tries: u32 = 0;
    loop {
        tries += 1;
        match attempt().await {
            Ok(()) => {
                handle.set(StorageStatus::Connected).await;
                log::info!("storage connected after {} attempt(s)", tries);
                return true;
            }
            Err(e) => log::warn!("storage connect attempt {} failed: {}", tries, e),
        }
        if max_attempts > 0 && tries >= max_attempts {
            handle.set(StorageStatus::Unreachable).await;
            log::error!("storage unreachable after {} attempts; continuing without it", tries);
            return false;
        }
        tokio::time::sleep(delay).await;
    }
}

/// Start the connection check for `uri`. Returns the shared handle and the task, if one was started.
pub fn spawn_probe(uri: Option<String>, config: &StorageConfig) -> (StorageHandle, Option<JoinHandle<()>>) {
    let Some(uri) = uri else {
        return (StorageHandle::disabled(), None);
    };
    let handle = StorageHandle::new(StorageStatus::Connecting);
    let delay = Duration::from_secs(config.retry_delay_secs);
    let attempt_timeout = delay.max(Duration::from_secs(1));
    let max_attempts = config.max_attempts;
    let h = handle.clone();
    let task = tokio::spawn(async move {
        let uri = uri.as_str();
        connect_with_retry(|| ping(uri, attempt_timeout), delay, max_attempts, &h).await;
    });
    (handle, Some(task))
}
