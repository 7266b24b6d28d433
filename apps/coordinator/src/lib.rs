//! Library surface for the coordinator binary. Exists so integration tests
//! under `tests/` can drive the Dispatcher and Generator directly, the way
//! the binary's own `main.rs` does, without spawning a subprocess.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod generator;
pub mod stop;
pub mod worker;
