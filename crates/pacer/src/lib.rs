// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Retry-and-rate-limit request scheduling.
//!
//! [`Pacer`] executes host-supplied requests on a bounded executor pool,
//! retrying failures against a configurable delay ladder and refusing new
//! work beyond a pending-request bound. The scheduling core is a scaled-down
//! sibling of the `jotter` cache pipeline: a dedicated main-queue thread, a
//! delay thread for not-yet-due retries, and bounded sleeps throughout so
//! lifecycle changes are observed promptly.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use pacer::{Pacer, PacerOptions, RequestExecutor};
//!
//! struct Printer;
//!
//! impl RequestExecutor for Printer {
//!     type Request = String;
//!
//!     fn execute(&self, request: &String, _attempt: u32) -> Result<(), pacer::BoxError> {
//!         println!("{request}");
//!         Ok(())
//!     }
//! }
//!
//! let pacer = Pacer::new(Printer, PacerOptions::builder("printer").build()?);
//! pacer.start()?;
//! pacer.submit("hello".to_owned())?;
//! assert!(pacer.shutdown_for(Duration::from_secs(2))?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;
mod error;
mod scheduler;
mod status;

pub use config::{PacerOptions, PacerOptionsBuilder};
pub use error::{BoxError, ConfigError, SubmitError};
pub use scheduler::{Pacer, RequestExecutor};
pub use status::PacerStatus;
