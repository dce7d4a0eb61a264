//! Shared storage integration tests.
//!
//! Tests the unit-of-work contract against every `Store` implementation.
//! Each backend's test file runs these through `run_unit_of_work_tests!`.

pub mod unit_of_work_tests;
