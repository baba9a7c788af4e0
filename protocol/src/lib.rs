//! Data model shared by the selection engine and its front-ends.
//!
//! Everything in this crate is plain data: the three hierarchy records, the
//! selection triple that survives reloads, caller identity, and the request /
//! response shapes exchanged with a remote backend.

pub mod identity;
pub mod level;
pub mod models;
pub mod query;
pub mod selection;

pub use identity::Identity;
pub use identity::Role;
pub use level::Level;
pub use models::Analyst;
pub use models::Client;
pub use models::Entity;
pub use models::Farm;
pub use models::QualificationTier;
pub use query::ChangeEvent;
pub use query::ChangeKind;
pub use query::ListQuery;
pub use query::ValidationReport;
pub use query::Validity;
pub use selection::Selection;
