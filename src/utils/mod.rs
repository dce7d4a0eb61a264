//! Process-level helpers for the binaries.

pub mod bootstrap;
