//! Integration tests for push and clone against the in-memory ledger

mod clone_scenario;
mod push_scenario;
mod test_utils;
