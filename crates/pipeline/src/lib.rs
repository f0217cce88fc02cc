//! Per-item calculation driver.
//!
//! [`driver::SessionDriver`] runs one work item end to end: it waits for
//! the engine slot, prepares a private working file, pushes the encoded
//! request row into an engine session, calculates, exports, reads the
//! outputs back and persists them. Cleanup runs on every path.

pub mod driver;
pub mod error;
pub mod exports;

pub use driver::{DriverConfig, JobOutcome, SessionDriver};
pub use error::JobError;
pub use exports::ArtifactPaths;
