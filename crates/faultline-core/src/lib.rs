//! # faultline-core
//!
//! Crash bisection driver. Given a crash reproducer and a source repository
//! under version control, the driver identifies the revision that first
//! introduced the crash (cause bisection) or first eliminated it (fix
//! bisection).
//!
//! The driver is a single-threaded coordinator: it owns the session state
//! and invokes its collaborators serially through blocking trait calls.
//! The collaborators are supplied by the embedding binary:
//!
//! - a [`vcs::Bisecter`] for repository operations and the binary-search
//!   oracle,
//! - a [`build::Builder`] for producing artifacts from checked-out
//!   revisions,
//! - a [`runner::TestRunner`] for running reproducer trials against a
//!   freshly built artifact,
//! - a [`trace::Tracer`] that receives the human-readable session
//!   transcript and named debug blobs.
//!
//! ## Example
//!
//! ```rust,no_run
//! use faultline_core::config::RunConfig;
//! use faultline_core::session;
//! use faultline_core::trace::NullTracer;
//! # fn collaborators() -> (Box<dyn faultline_core::vcs::Bisecter>,
//! #     Box<dyn faultline_core::build::Builder>,
//! #     Box<dyn faultline_core::runner::TestRunner>) { unimplemented!() }
//!
//! # fn main() -> Result<(), faultline_core::Error> {
//! let cfg: RunConfig = todo!();
//! let (mut repo, mut builder, mut runner) = collaborators();
//! let bisection = session::run(
//!     &cfg,
//!     repo.as_mut(),
//!     builder.as_mut(),
//!     runner.as_mut(),
//!     &NullTracer,
//! )?;
//! println!("{:?}", bisection.outcome);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod build;
pub mod config;
pub mod error;
pub mod runner;
pub mod semaphore;
pub mod session;
pub mod trace;
pub mod vcs;

pub use config::{Mode, RunConfig};
pub use error::Error;
pub use session::{run, Bisection, Outcome, TestResult};
