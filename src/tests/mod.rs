//! Crate-level integration tests: whole programs driven end to end through
//! [`crate::evaluator`], as opposed to the per-module unit tests living
//! alongside their own source files.

mod scenarios;
