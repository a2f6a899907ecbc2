//! Keep-alive pinger: GETs a URL on a fixed interval so free-tier hosts do not idle out.

use crate::outbound::ApiClient;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Start the ping loop. It stops when `shutdown` flips to true or its sender is dropped,
/// abandoning a ping that is still in flight.
pub fn spawn(
    api: ApiClient,
    url: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    log::info!("keep-alive: pinging {} every {:?}", url, interval);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        // A ping slower than the interval must not be followed by a burst of catch-up pings.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so the first ping waits one interval.
        ticker.tick().await;
        loop {
            let stop = tokio::select! {
                _ = ticker.tick() => tokio::select! {
                    _ = ping_once(&api, &url) => false,
                    changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
                },
                changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
            };
            if stop {
                break;
            }
        }
        log::info!("keep-alive: stopped");
    })
}

/// One ping. Errors are logged and swallowed.
pub async fn ping_once(api: &ApiClient, url: &str) {
    match api.ping(url).await {
        Ok(status) => log::debug!("keep-alive: {} -> {}", url, status),
        Err(e) => log::debug!("keep-alive request to {} failed: {}", url, e),
    }
}
