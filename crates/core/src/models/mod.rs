//! Local entities maintained by the sync engine.

pub mod attendance;
pub mod common;
pub mod course;
pub mod grade;
pub mod sync;
pub mod task;
