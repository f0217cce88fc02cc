//! Calculation engine access.
//!
//! The engine is reached only through the narrow [`EngineConnector`] /
//! [`EngineSession`] pair in [`session`]. [`process`] drives an external
//! bridge executable over a line-delimited JSON protocol
//! ([`protocol`]); [`loopback`] is an in-process stand-in for dry runs
//! and tests. [`artifact`] owns the private working copy each session
//! runs against.
//!
//! [`EngineConnector`]: session::EngineConnector
//! [`EngineSession`]: session::EngineSession

pub mod artifact;
pub mod loopback;
pub mod process;
pub mod protocol;
pub mod session;
