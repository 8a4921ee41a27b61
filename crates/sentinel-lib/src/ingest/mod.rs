//! Sample ingestion
//!
//! Decouples request handlers from analysis with a bounded queue that drops
//! samples instead of applying backpressure.

mod queue;

pub use queue::{EnqueueOutcome, IngestQueue, QueueConsumer, QUEUE_CAPACITY};
