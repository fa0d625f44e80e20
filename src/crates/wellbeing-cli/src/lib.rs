//! Wellbeing action plan assistant
//!
//! Builds a personalised wellbeing action plan for a reported problem:
//! a planner and an AI reviewer draft steps, the user approves or comments,
//! and a simulated consultation per step gathers evidence from web and
//! Wikipedia search before everything is written up as one plan.
//!
//! The workflow runs on `stategraph-core`; a session can be suspended at the
//! feedback prompt and resumed later from its checkpoints.

pub mod config;
pub mod console;
pub mod error;
pub mod graphs;
pub mod models;
pub mod prompts;
pub mod search;
pub mod session;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use graphs::Collaborators;
pub use session::{ConsoleFeedback, FeedbackSource, Session};
