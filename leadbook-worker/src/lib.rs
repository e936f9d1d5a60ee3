//! # Leadbook Worker Library
//!
//! Delivers queued email sends and prunes expired credentials.
//!
//! ## Modules
//!
//! - `config`: Configuration from environment variables
//! - `mailers`: Transport resolution per send (owner SMTP, system mailer)
//! - `maintenance`: Expired session and reset token cleanup
//! - `orchestrator`: Poll, deliver and record loop
//! - `queue`: Claiming sends and recording outcomes

pub mod config;
pub mod mailers;
pub mod maintenance;
pub mod orchestrator;
pub mod queue;
