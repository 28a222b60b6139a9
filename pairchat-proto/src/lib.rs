//! Shared payload, topic naming and codec definitions for `PairChat`.

pub mod codec;
pub mod presence;
pub mod sample;
pub mod topic;
pub mod username;
