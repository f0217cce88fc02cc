//! Domain types shared by every crate in the sizing workspace.
//!
//! Holds the work-key format, the parameter codec with its static code
//! tables, and the common error type. Nothing here touches the database
//! or the calculation engine.

pub mod codec;
pub mod error;
pub mod types;
pub mod work_key;
