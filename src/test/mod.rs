//! Shared fixtures for unit tests: hand-built modules and a small stack evaluator to run
//! patched bodies against a recording dispatcher.

pub mod factories;
