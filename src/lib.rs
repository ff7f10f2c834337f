//! idlewake - Idle-wakeup analysis of CPU context-switch traces
//!
//! This library turns already-decoded context-switch samples into per-thread
//! and per-callstack idle-wakeup statistics, and encodes the wakeup stacks
//! into a deduplicated, gzip-compressed pprof profile.

pub mod analysis;
pub mod chrome;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod filter;
pub mod input;
pub mod intern;
pub mod pprof;
pub mod report;
pub mod sample;
pub mod serializer;
pub mod signature;
pub mod stats;
