//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep the CLI and request handlers decoupled from storage details.

pub mod eligibility_service;
pub mod provisioning_service;
pub mod reconcile_service;
