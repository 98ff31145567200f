//! Fixtures for tests of the engine and of crates built on it. Enabled with the `test_utils` feature.
pub mod fake_processor;
pub mod fixtures;
pub mod prepare_env;
pub mod system;
