//! Building blocks of the `vagrant-compute-node` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod watcher;

pub use config::Config;
pub use watcher::{NodeChangeEvent, NodeWatcher};
