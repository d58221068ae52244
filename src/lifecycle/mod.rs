//! Process lifecycle.
//!
//! # Responsibilities
//! - Coordinate graceful shutdown across the server and background tasks
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task subscribes and drains
//!   in-flight work when the signal fires

pub mod shutdown;

pub use shutdown::Shutdown;
