//! Partner directory domain module (supplier/seller businesses, event-sourced).
//!
//! Business rules for counter-parties and their trust classification,
//! implemented purely as deterministic domain logic (no IO, no storage).

pub mod partner;
pub mod trust;

pub use partner::{
    ContactInfo, LinkVerified, LinkedBusiness, Partner, PartnerCommand, PartnerEvent, PartnerId,
    PartnerRegistered, PartnerStatus, PartnerSuspended, PartnerUpdated, PerformanceRecorded,
    RecordPerformance, RegisterPartner, SuspendPartner, UpdateDetails, VerifyLink,
};
pub use trust::{PerformanceScore, TrustBand};
