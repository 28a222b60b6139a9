//! `PairChat`: several one-to-one conversations over a shared pub/sub bus.

pub mod chatlog;
pub mod config;
pub mod echo;
pub mod menu;
pub mod session;
pub mod theme;
pub mod transport;
