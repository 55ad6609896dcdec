//! # vagrant-compute Common
//!
//! Shared utilities for the vagrant-compute binaries.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use vagrant_compute_common::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Pretty).unwrap();
//! ```

pub mod logging;

pub use logging::{init_logging, LogFormat};
