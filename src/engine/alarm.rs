//! Alarm forwarding.
//!
//! While an alarm endpoint is registered, Error-level messages are queued to a
//! single background task that POSTs each one as JSON. Clearing the alarm
//! delivers whatever is already queued, then ends the task.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

/// JSON body POSTed to the alarm endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlarmMessage {
    pub module: String,
    pub trace_id: String,
    pub key: String,
    pub message: String,
}

/// Background worker delivering Error-level messages to a remote endpoint.
///
/// Delivery is at-most-once: each message is POSTed a single time and
/// failures are only logged. The queue is bounded; when it is full the
/// newest message is dropped rather than blocking the logging caller.
#[derive(Debug)]
pub struct AlarmDispatcher {
    endpoint: Url,
    tx: mpsc::Sender<AlarmMessage>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl AlarmDispatcher {
    /// Spawn the consumer task
    pub fn start(endpoint: Url, client: reqwest::Client, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let target = endpoint.clone();

        let handle = tokio::spawn(async move {
            let result = AssertUnwindSafe(Self::run(target, client, rx, stop_rx))
                .catch_unwind()
                .await;
            if let Err(e) = result {
                error!(panic = ?e, "Alarm dispatcher panicked");
            }
        });

        Self {
            endpoint,
            tx,
            stop: Some(stop_tx),
            handle,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Whether the consumer task is still alive
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Queue a message without waiting. Returns `false` if it was dropped.
    pub fn enqueue(&self, message: AlarmMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(
                    endpoint = %self.endpoint,
                    module = %message.module,
                    "Alarm queue full, dropping message"
                );
                crate::metrics::record_alarm("dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(endpoint = %self.endpoint, "Alarm dispatcher is not running, dropping message");
                crate::metrics::record_alarm("dropped");
                false
            }
        }
    }

    /// Signal the consumer to exit once every message already queued has
    /// been delivered. New messages are refused from this point on.
    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    async fn run(
        endpoint: Url,
        client: reqwest::Client,
        mut rx: mpsc::Receiver<AlarmMessage>,
        mut stop: oneshot::Receiver<()>,
    ) {
        debug!(endpoint = %endpoint, "Alarm dispatcher started");
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    rx.close();
                    while let Some(message) = rx.recv().await {
                        Self::deliver(&client, &endpoint, &message).await;
                    }
                    break;
                }
                message = rx.recv() => match message {
                    Some(message) => Self::deliver(&client, &endpoint, &message).await,
                    None => break,
                },
            }
        }
        debug!(endpoint = %endpoint, "Alarm dispatcher stopped");
    }

    async fn deliver(client: &reqwest::Client, endpoint: &Url, message: &AlarmMessage) {
        let result = client
            .post(endpoint.clone())
            .json(message)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => crate::metrics::record_alarm("sent"),
            Err(e) => {
                warn!(
                    endpoint = %endpoint,
                    module = %message.module,
                    error = %e,
                    "Failed to deliver alarm"
                );
                crate::metrics::record_alarm("failed");
            }
        }
    }
}

impl Drop for AlarmDispatcher {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_alarm_message_field_names() {
        let message = AlarmMessage {
            module: "svc".to_string(),
            trace_id: "0x007".to_string(),
            key: "db".to_string(),
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["Module"], "svc");
        assert_eq!(json["TraceId"], "0x007");
        assert_eq!(json["Key"], "db");
        assert_eq!(json["Message"], "boom");
    }

    #[tokio::test]
    async fn test_stop_ends_worker() {
        let endpoint = Url::parse("http://127.0.0.1:9/alarm").unwrap();
        let dispatcher = AlarmDispatcher::start(endpoint, reqwest::Client::new(), 4);
        assert!(dispatcher.is_running());

        let handle_probe = dispatcher.tx.clone();
        dispatcher.stop();

        tokio::time::timeout(Duration::from_secs(1), handle_probe.closed())
            .await
            .expect("dispatcher did not stop");
    }
}
