//! # Leadbook API Server Library
//!
//! Router, configuration, middleware and handlers for the Leadbook API.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration from environment variables
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Request metadata extractor
//! - `middleware`: Session, license, admin, rate limit and security layers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
