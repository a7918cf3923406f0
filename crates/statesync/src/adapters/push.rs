//! Server-push adapter: a WebSocket stream of record updates, reconnected
//! with exponential backoff, grounded directly on
//! `cdk_common::pub_sub::remote_consumer::Consumer::stream`'s backoff
//! shape (this port adds a maximum attempt count the teacher's version
//! does not have, per an explicit requirement recorded in DESIGN.md).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;

use statesync_transport::ws;

const BASE_BACKOFF: Duration = Duration::from_millis(1_000);
const MAX_BACKOFF: Duration = Duration::from_millis(30_000);

/// How an incoming push event is folded into a collection's state.
#[derive(Debug, Clone)]
pub enum PushMode {
    /// Replace the whole collection with the event's payload.
    Replace,
    /// Append the event's record, optionally deduplicating by a key and
    /// capping the list length.
    Append {
        /// Field used to detect and skip duplicates, if any.
        dedupe_key: Option<String>,
        /// Drop the oldest entries once the list exceeds this length.
        max_items: Option<usize>,
    },
    /// Insert or replace the record by id.
    Upsert,
}

/// A parsed push event handed to the store for application.
#[derive(Debug, Clone)]
pub struct PushEvent<R> {
    /// The event's kind, matched against `event_filter` before dispatch.
    pub kind: Option<String>,
    /// The deserialized record payload.
    pub record: R,
}

/// Connection parameters for a [`PushAdapter`].
pub struct PushAdapter {
    url: String,
    headers: Vec<(String, String)>,
    event_filter: Option<String>,
    max_attempts: Option<u32>,
}

impl std::fmt::Debug for PushAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushAdapter").field("url", &self.url).finish()
    }
}

impl PushAdapter {
    /// Build a push adapter connecting to `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            event_filter: None,
            max_attempts: None,
        }
    }

    /// Only dispatch events whose `"event"` field equals `kind`.
    pub fn with_event_filter(mut self, kind: impl Into<String>) -> Self {
        self.event_filter = Some(kind.into());
        self
    }

    /// Stop reconnecting after `attempts` consecutive failures.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Attach request headers sent on the upgrade request.
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Connect and reconnect with exponential backoff + jitter,
    /// dispatching every parsed, filter-matching event to `on_event`,
    /// until `stop` is signalled. Returns the background task handle.
    pub fn spawn<R>(self: Arc<Self>, on_event: Arc<dyn Fn(PushEvent<R>) + Send + Sync>) -> PushHandle
    where
        R: DeserializeOwned + Send + Sync + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_task = stop.clone();

        let handle = tokio::spawn(async move {
            let mut backoff = BASE_BACKOFF;
            let mut attempts: u32 = 0;

            while !stop_for_task.load(Ordering::Relaxed) {
                if let Some(max) = self.max_attempts {
                    if attempts >= max {
                        statesync_log::log_error!(
                            "push adapter giving up after {attempts} attempts"
                        );
                        break;
                    }
                }

                let header_refs: Vec<(&str, &str)> = self
                    .headers
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();

                match ws::connect(&self.url, &header_refs).await {
                    Ok((_sender, mut receiver)) => {
                        attempts = 0;
                        backoff = BASE_BACKOFF;
                        while let Some(message) = receiver.recv().await {
                            if stop_for_task.load(Ordering::Relaxed) {
                                break;
                            }
                            match message {
                                Ok(text) => dispatch::<R>(&text, &self.event_filter, &on_event),
                                Err(e) => {
                                    statesync_log::log_warn!("push adapter read error: {e}");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        statesync_log::log_warn!("push adapter connect failed: {e}");
                    }
                }

                if stop_for_task.load(Ordering::Relaxed) {
                    break;
                }

                attempts += 1;
                let jitter_ms = rand::rng().random_range(0..250);
                tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
                backoff = (backoff + BASE_BACKOFF).min(MAX_BACKOFF);
            }
        });

        PushHandle { stop, task: handle }
    }
}

fn dispatch<R>(
    text: &str,
    event_filter: &Option<String>,
    on_event: &Arc<dyn Fn(PushEvent<R>) + Send + Sync>,
) where
    R: DeserializeOwned,
{
    let parsed: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            statesync_log::log_warn!("push adapter could not parse event: {e}");
            return;
        }
    };

    let kind = parsed
        .get("event")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(filter) = event_filter {
        if kind.as_deref() != Some(filter.as_str()) {
            return;
        }
    }

    let payload = parsed.get("data").cloned().unwrap_or(parsed);
    match serde_json::from_value::<R>(payload) {
        Ok(record) => on_event(PushEvent { kind, record }),
        Err(e) => statesync_log::log_warn!("push adapter could not decode record: {e}"),
    }
}

/// Handle to a running push connection; dropping or calling
/// [`PushHandle::stop`] ends the reconnect loop.
pub struct PushHandle {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for PushHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushHandle").finish_non_exhaustive()
    }
}

impl PushHandle {
    /// Stop reconnecting and abort the background task.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.task.abort();
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Todo {
        id: String,
    }

    #[test]
    fn dispatch_skips_events_failing_the_filter() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls2 = calls.clone();
        let on_event: Arc<dyn Fn(PushEvent<Todo>) + Send + Sync> = Arc::new(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });

        dispatch(
            r#"{"event":"deleted","data":{"id":"1"}}"#,
            &Some("created".to_string()),
            &on_event,
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispatch_decodes_matching_event() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen2 = seen.clone();
        let on_event: Arc<dyn Fn(PushEvent<Todo>) + Send + Sync> = Arc::new(move |event| {
            *seen2.lock().unwrap() = Some(event.record.id);
        });

        dispatch(
            r#"{"event":"created","data":{"id":"42"}}"#,
            &Some("created".to_string()),
            &on_event,
        );
        assert_eq!(seen.lock().unwrap().as_deref(), Some("42"));
    }

    #[test]
    fn malformed_event_is_swallowed_not_panicked() {
        let on_event: Arc<dyn Fn(PushEvent<Todo>) + Send + Sync> = Arc::new(|_| {
            panic!("should never be called");
        });
        dispatch("not json", &None, &on_event);
    }
}
