//! No library surface of its own — this package exists to host the
//! workspace's end-to-end integration test suites under `tests/integration/`
//! (§8).
