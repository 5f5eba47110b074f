//! Satchel Core: capability-aware sync engine between a remote learning platform and a local store.

pub mod capability;
pub mod config;
pub mod db;
pub mod error;
pub mod fallback;
pub mod models;
pub mod reconcile;
pub mod remote;
pub mod sync;
