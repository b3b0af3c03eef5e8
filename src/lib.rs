//! quotecache library
//!
//! A three-tier (memory, disk, archive) cache for market-data payloads and a
//! per-symbol fetch circuit breaker. The binary is a thin diagnostics front
//! end over these modules.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data;
pub mod fetch;
pub mod logging;
pub mod refresh;
