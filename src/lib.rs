//! Bookshelf application library
//!
//! Wires the project modules onto the kernel registry and exposes the
//! process entry points shared by the binary and the CLI.

pub mod app;
pub mod modules;

pub use app::{build, migrate, serve, App};
