//! Detached feedback submission.
//!
//! Each record is handed to the backend at most once, on its own task and
//! under a timeout. Failures are logged and dropped; nothing is retried and
//! nothing reaches the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::pipeline::types::{FeedbackRecord, FeedbackSink};

/// Fire-and-forget front for a [`FeedbackSink`].
#[derive(Clone)]
pub struct FeedbackRecorder {
    sink: Arc<dyn FeedbackSink>,
    timeout: Duration,
}

impl FeedbackRecorder {
    pub fn new(sink: Arc<dyn FeedbackSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Submit `record` in the background. The handle is only useful to
    /// tests; production callers drop it.
    pub fn submit(&self, record: FeedbackRecord) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let timeout = self.timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, sink.submit(&record)).await {
                Ok(Ok(())) => {
                    debug!(
                        contact = %record.contact,
                        accepted = record.accepted,
                        edited = record.edited,
                        "Feedback recorded"
                    );
                }
                Ok(Err(e)) => {
                    warn!(contact = %record.contact, error = %e, "Feedback submission failed, discarding");
                }
                Err(_) => {
                    warn!(contact = %record.contact, timeout = ?timeout, "Feedback submission timed out, discarding");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::ServiceError;

    #[derive(Default)]
    struct CollectingSink {
        records: Mutex<Vec<FeedbackRecord>>,
    }

    #[async_trait]
    impl FeedbackSink for CollectingSink {
        async fn submit(&self, record: &FeedbackRecord) -> Result<(), ServiceError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FailingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeedbackSink for FailingSink {
        async fn submit(&self, _record: &FeedbackRecord) -> Result<(), ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Rejected {
                service: "feedback".into(),
                status: 500,
            })
        }
    }

    struct HangingSink;

    #[async_trait]
    impl FeedbackSink for HangingSink {
        async fn submit(&self, _record: &FeedbackRecord) -> Result<(), ServiceError> {
            std::future::pending().await
        }
    }

    fn record() -> FeedbackRecord {
        FeedbackRecord::new("Bob", "hi", "hey", "hey", true, false)
    }

    #[tokio::test]
    async fn delivers_record() {
        let sink = Arc::new(CollectingSink::default());
        let recorder = FeedbackRecorder::new(sink.clone(), Duration::from_secs(1));
        recorder.submit(record()).await.unwrap();
        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].contact, "Bob");
    }

    #[tokio::test]
    async fn failure_is_swallowed_without_retry() {
        let sink = Arc::new(FailingSink::default());
        let recorder = FeedbackRecorder::new(sink.clone(), Duration::from_secs(1));
        // Task completes normally even though the backend rejected the record.
        recorder.submit(record()).await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hanging_backend_is_cut_off() {
        let recorder = FeedbackRecorder::new(Arc::new(HangingSink), Duration::from_millis(20));
        tokio::time::timeout(Duration::from_secs(2), recorder.submit(record()))
            .await
            .expect("submission should give up after its own timeout")
            .unwrap();
    }
}
