//! Aggregated integration suite.

mod account_tests;
mod common;
mod engine_tests;
mod invariant_props;
mod matching_tests;
mod recovery_tests;
mod risk_tests;
