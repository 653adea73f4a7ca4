//! Request admission controls.

pub mod rate_limit;
