//! Progress Notifier (C16): per-job in-memory registry of recent events with
//! a push channel to an HTTP client (spec.md §4.13).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

/// Bounded ring size: "the last 10 events" (spec.md §4.13).
const RING_CAPACITY: usize = 10;

/// One progress event for a job. The distinguished `complete` kind signals
/// job completion to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress { processed_items: u32, total_items: u32, success_count: u32, failure_count: u32 },
    Complete { status: String },
}

struct JobEntry {
    ring: VecDeque<ProgressEvent>,
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

/// Registry of in-flight jobs' progress state, keyed by jobId.
#[derive(Clone, Default)]
pub struct ProgressNotifier {
    jobs: Arc<Mutex<HashMap<String, JobEntry>>>,
}

impl ProgressNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a client to a job's events, returning the receiving half of
    /// the push channel. Creates the job's ring if it doesn't exist yet.
    pub async fn subscribe(&self, job_id: &str) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut jobs = self.jobs.lock().await;
        let entry = jobs.entry(job_id.to_string()).or_insert_with(|| JobEntry { ring: VecDeque::new(), sender: None });
        entry.sender = Some(sender);
        receiver
    }

    /// Append an event to the job's ring and best-effort push it to a
    /// subscribed client. On send failure the channel is closed and the
    /// entry removed (spec.md §4.13).
    pub async fn publish(&self, job_id: &str, event: ProgressEvent) {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs.entry(job_id.to_string()).or_insert_with(|| JobEntry { ring: VecDeque::new(), sender: None });

        entry.ring.push_back(event.clone());
        while entry.ring.len() > RING_CAPACITY {
            entry.ring.pop_front();
        }

        if let Some(sender) = &entry.sender {
            if sender.send(event).is_err() {
                entry.sender = None;
            }
        }
    }

    /// Remove a job's entry, e.g. once its push channel has been drained.
    pub async fn remove(&self, job_id: &str) {
        self.jobs.lock().await.remove(job_id);
    }

    /// Snapshot of the last events recorded for a job (for diagnostics or a
    /// client that connects after some events already fired).
    pub async fn recent_events(&self, job_id: &str) -> Vec<ProgressEvent> {
        self.jobs
            .lock()
            .await
            .get(job_id)
            .map(|entry| entry.ring.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let notifier = ProgressNotifier::new();
        let mut receiver = notifier.subscribe("job1").await;

        notifier
            .publish("job1", ProgressEvent::Progress { processed_items: 1, total_items: 2, success_count: 1, failure_count: 0 })
            .await;

        let event = receiver.recv().await.expect("event");
        assert!(matches!(event, ProgressEvent::Progress { processed_items: 1, .. }));
    }

    #[tokio::test]
    async fn ring_is_bounded_to_ten_events() {
        let notifier = ProgressNotifier::new();
        for i in 0..15 {
            notifier
                .publish("job1", ProgressEvent::Progress { processed_items: i, total_items: 15, success_count: i, failure_count: 0 })
                .await;
        }
        assert_eq!(notifier.recent_events("job1").await.len(), RING_CAPACITY);
    }

    #[tokio::test]
    async fn dropping_the_receiver_clears_the_sender_on_next_publish() {
        let notifier = ProgressNotifier::new();
        {
            let _receiver = notifier.subscribe("job1").await;
        }
        notifier
            .publish("job1", ProgressEvent::Complete { status: "ENRICHED_COMPLETE".into() })
            .await;
        // No panic on send failure; ring still recorded the event.
        assert_eq!(notifier.recent_events("job1").await.len(), 1);
    }
}
