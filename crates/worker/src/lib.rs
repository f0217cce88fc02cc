//! The calculation job queue.
//!
//! Producers [`enqueue`](queue::JobQueue::enqueue) work-key tokens without
//! blocking. A single drain at a time ([`SizingWorker::start_draining`])
//! pops them in FIFO order and hands each to the
//! [`SessionDriver`](valvesize_pipeline::SessionDriver), which serializes
//! engine access through its one-slot gate.
//!
//! [`SizingWorker::start_draining`]: worker::SizingWorker::start_draining

pub mod api;
pub mod config;
pub mod drain;
pub mod events;
pub mod queue;
pub mod worker;
