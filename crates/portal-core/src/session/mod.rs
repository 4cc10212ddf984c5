//! Session domain module.
//!
//! - `model`: the authenticated identity (`Session`, `UserProfile`, `SessionToken`)
//! - `repository`: persistence trait (`SessionRepository`)
//! - `service`: remote profile endpoints (`ProfileService`, `ProfileUpdate`)

mod model;
mod repository;
mod service;

pub use model::{BankDetails, ReportingLine, Session, SessionToken, UserProfile};
pub use repository::{SESSION_STORAGE_KEY, SessionRepository};
pub use service::{
    AcknowledgementStatus, BankAcknowledgement, EvidencePayload, ProfileLookup, ProfileService,
    ProfileUpdate,
};
