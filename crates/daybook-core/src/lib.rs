//! Core model for Daybook: tasks, views derived from them, and the storage contract.
//! Nothing in here touches the filesystem or a terminal.

pub mod calendar;
pub mod clock;
pub mod events;
pub mod filter;
pub mod settings;
pub mod stats;
pub mod storage;
pub mod tasks;
