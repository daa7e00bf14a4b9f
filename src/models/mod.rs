//! Data shapes exchanged between the transfer core and its clients.
//!
//! Nothing here is persisted; entries are rebuilt from the backend on every
//! listing and progress messages live only as long as their socket.

pub mod entry;
pub mod progress;
