//! Typed domain records decoded from store documents.
//!
//! # Responsibility
//! - Define the canonical identifier form used by every comparison.
//! - Define Member/Group/Item records and their explicit decode step.
//!
//! # Invariants
//! - No untyped document map crosses into reconciliation or eligibility logic.
//! - Identifier equality is always canonical equality.

pub mod decode;
pub mod group;
pub mod identifier;
pub mod item;
pub mod member;
