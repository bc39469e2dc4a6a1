//! Core domain logic for roster: group membership reconciliation and
//! item eligibility over a document store.
//! This crate is the single source of truth for membership invariants.

pub mod config;
pub mod credentials;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use config::{ConfigError, RosterConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_timeout, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::group::Group;
pub use model::identifier::{CanonicalId, IdentifierError};
pub use model::item::{Item, ItemStatus};
pub use model::member::Member;
pub use repo::group_repo::{GroupRepository, StoreGroupRepository};
pub use repo::item_repo::{ItemRepository, NewItem, StoreItemRepository};
pub use repo::member_repo::{MemberRepository, NewMember, StoreMemberRepository};
pub use repo::{Collections, RepoError, RepoResult};
pub use service::eligibility_service::{Eligibility, EligibilityError, EligibilityResolver};
pub use service::provisioning_service::{MemberRequest, ProvisionError, ProvisioningService};
pub use service::reconcile_service::{
    GroupDrift, MembershipReconciler, ReconcileError, ReconciliationReport,
};
pub use store::{DocumentStore, SqliteDocumentStore, StoreError, StoreResult};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
