//! Unit test suite for gridstore-store
//!
//! Run with: `cargo test -p gridstore-store --test unit`

mod bulk_tests;
mod copy_tests;
mod isolation_tests;
mod link_tests;
mod loader_tests;
mod schema_store_tests;
mod support;
