//! The async deployment processor (spec §4.5, component C5): turns a
//! portable resource record into a realized deployment and back, built atop
//! the generic job-queue framework in `automations`.

pub mod apply;
pub mod environment;
pub mod job;
pub mod recipe;
pub mod render;
pub mod secret;

pub use environment::EnvironmentRegistry;
pub use job::{DeployExecutor, DeployJobState, Verb};
