//! Concrete collaborators for the driver: a git repository adapter and
//! command-driven builder/test-runner adapters.

mod build;
mod git;
mod runner;

pub use build::CommandBuilder;
pub use git::GitRepo;
pub use runner::CommandRunner;
