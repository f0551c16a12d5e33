//! Docbuffer - bounded per-destination document buffering for bulk transfers.

pub mod buffer;
pub mod config;
pub mod manager;
pub mod plan;
pub mod registry;
pub mod session;
pub mod size;
pub mod types;
