//! Reply pipeline.
//!
//! Every incoming message flows through:
//! 1. `IngestQueue::enqueue()`: bounded channel, rejects when full
//! 2. `DraftService::draft()`: AI draft (critical path)
//! 3. `estimate_confidence()`: text-feature score, no I/O
//! 4. `decide()`: auto-send verdict against a policy snapshot
//! 5. `Presenter::present()`: every message is shown for review
//! 6. `Transport::send()`: only for auto-send verdicts on SMS
//!
//! Outcomes are reported to the learning backend through `FeedbackRecorder`.

pub mod confidence;
pub mod decision;
pub mod feedback;
pub mod ingest;
pub mod processor;
pub mod types;
