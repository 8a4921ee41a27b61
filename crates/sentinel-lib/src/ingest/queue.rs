//! Bounded drop-on-full queue between request handlers and the analyzer

use crate::models::Sample;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::debug;

/// Default number of samples the queue can hold
pub const QUEUE_CAPACITY: usize = 20_000;

/// Result of offering a sample to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Sample is queued for analysis
    Accepted,
    /// Queue already holds `capacity` samples, sample dropped
    Full,
    /// Sample carries non-finite numbers, sample dropped
    Rejected,
    /// Queue was closed for shutdown, sample dropped
    Closed,
}

impl EnqueueOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, EnqueueOutcome::Accepted)
    }

    /// Label used for the dropped-samples metric
    pub fn as_str(&self) -> &'static str {
        match self {
            EnqueueOutcome::Accepted => "accepted",
            EnqueueOutcome::Full => "full",
            EnqueueOutcome::Rejected => "rejected",
            EnqueueOutcome::Closed => "closed",
        }
    }
}

/// Producer side of the ingest queue
///
/// Cheap to clone; every request handler holds one. Enqueueing never waits.
#[derive(Debug, Clone)]
pub struct IngestQueue {
    sender: mpsc::Sender<Sample>,
    closed: Arc<watch::Sender<bool>>,
}

/// Consumer side of the ingest queue, owned by the analyzer loop
#[derive(Debug)]
pub struct QueueConsumer {
    receiver: mpsc::Receiver<Sample>,
    closed: watch::Receiver<bool>,
    producers_gone: bool,
}

impl IngestQueue {
    /// Create a queue holding at most `capacity` samples (minimum 1)
    pub fn bounded(capacity: usize) -> (Self, QueueConsumer) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (closed_tx, closed_rx) = watch::channel(false);
        let queue = Self {
            sender,
            closed: Arc::new(closed_tx),
        };
        let consumer = QueueConsumer {
            receiver,
            closed: closed_rx,
            producers_gone: false,
        };
        (queue, consumer)
    }

    /// Offer a sample without blocking and report what happened to it
    pub fn offer(&self, sample: Sample) -> EnqueueOutcome {
        if *self.closed.borrow() {
            return EnqueueOutcome::Closed;
        }

        if !sample.is_finite() {
            debug!(device = %sample.device, "Rejecting sample with non-finite values");
            return EnqueueOutcome::Rejected;
        }

        match self.sender.try_send(sample) {
            Ok(()) => EnqueueOutcome::Accepted,
            Err(TrySendError::Full(_)) => EnqueueOutcome::Full,
            Err(TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Non-blocking enqueue; `false` means the sample was dropped
    pub fn try_enqueue(&self, sample: Sample) -> bool {
        self.offer(sample).is_accepted()
    }

    /// Number of samples waiting for the analyzer
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Stop accepting samples and wake the consumer
    ///
    /// A waiting [`QueueConsumer::dequeue`] returns `None` right away, so the
    /// analyzer loop exits. Samples still queued are not drained.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.sender.is_closed()
    }
}

impl QueueConsumer {
    /// Wait for the next sample in enqueue order
    ///
    /// Returns `None` as soon as the queue is closed, or once every producer
    /// handle has been dropped and the queue is empty.
    pub async fn dequeue(&mut self) -> Option<Sample> {
        loop {
            if *self.closed.borrow() {
                return None;
            }

            tokio::select! {
                biased;

                changed = self.closed.changed(), if !self.producers_gone => {
                    if changed.is_err() {
                        // every producer is gone; drain what is left
                        self.producers_gone = true;
                    }
                }
                next = self.receiver.recv() => return next,
            }
        }
    }

    /// Take the next sample if one is already waiting, even after close
    pub fn try_dequeue(&mut self) -> Option<Sample> {
        match self.receiver.try_recv() {
            Ok(sample) => Some(sample),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(device: &str, rps: i64) -> Sample {
        Sample::new(device, 1_700_000_000, 12.5, rps)
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let (queue, mut consumer) = IngestQueue::bounded(3);

        assert!(queue.try_enqueue(sample("d", 1)));
        assert!(queue.try_enqueue(sample("d", 2)));
        assert!(queue.try_enqueue(sample("d", 3)));

        assert_eq!(queue.offer(sample("d", 4)), EnqueueOutcome::Full);
        assert!(!queue.try_enqueue(sample("d", 5)));
        assert_eq!(queue.len(), 3);

        let drained: Vec<i64> = std::iter::from_fn(|| consumer.try_dequeue())
            .map(|s| s.rps)
            .collect();
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_default_capacity_bound() {
        let (queue, _consumer) = IngestQueue::bounded(QUEUE_CAPACITY);

        for i in 0..QUEUE_CAPACITY {
            assert!(queue.try_enqueue(sample("d", i as i64)));
        }
        assert!(!queue.try_enqueue(sample("d", -1)));
        assert_eq!(queue.len(), QUEUE_CAPACITY);
        assert_eq!(queue.capacity(), QUEUE_CAPACITY);
    }

    #[test]
    fn test_non_finite_sample_rejected() {
        let (queue, _consumer) = IngestQueue::bounded(4);

        let outcome = queue.offer(Sample::new("d", 0, f64::INFINITY, 10));
        assert_eq!(outcome, EnqueueOutcome::Rejected);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_refuses_samples() {
        let (queue, mut consumer) = IngestQueue::bounded(4);
        assert!(queue.try_enqueue(sample("d", 1)));

        queue.close();
        assert!(queue.is_closed());
        assert_eq!(queue.offer(sample("d", 2)), EnqueueOutcome::Closed);

        // dequeue stops waiting; the leftover sample can still be polled
        assert!(consumer.dequeue().await.is_none());
        assert_eq!(consumer.try_dequeue().map(|s| s.rps), Some(1));
        assert!(consumer.try_dequeue().is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let (queue, mut consumer) = IngestQueue::bounded(4);

        let waiter = tokio::spawn(async move { consumer.dequeue().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.close();

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("consumer was not woken by close")
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_preserves_fifo_order() {
        let (queue, mut consumer) = IngestQueue::bounded(16);
        let producer = queue.clone();

        for i in 0..10 {
            assert!(producer.try_enqueue(sample("d", i)));
        }
        drop(producer);
        drop(queue);

        let mut seen = Vec::new();
        while let Some(s) = consumer.dequeue().await {
            seen.push(s.rps);
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_producer() {
        let (queue, mut consumer) = IngestQueue::bounded(4);

        let producer = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            queue.try_enqueue(Sample::new("late", 5, 1.0, 42))
        });

        let received = consumer.dequeue().await.unwrap();
        assert_eq!(received.device, "late");
        assert!(producer.await.unwrap());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let (queue, _consumer) = IngestQueue::bounded(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.try_enqueue(sample("d", 1)));
        assert!(!queue.try_enqueue(sample("d", 2)));
    }
}
