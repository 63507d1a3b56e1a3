//! Core registration abstractions: reservation, dispatch, and the store seam.

pub mod audit;
pub mod dispatch;
pub mod error;
pub mod maintenance;
pub mod registration;
pub mod reservation;
pub mod spawn;
pub mod store;

pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use dispatch::{
    Delivery, DispatchGovernor, DispatchStats, SendHandle, SendOutcome, SendReceipt, SendRequest,
    SenderIdentity, Transport, TransportError,
};
pub use error::{AppResult, DispatchError, RegistryError};
pub use maintenance::{HiddenSkillHolder, HiddenSkillMaintenance, NoticeReport, ReleaseReport};
pub use registration::{
    DetailsSubmission, MatricLookup, RegistrationService, SkillSelection, TrainerContact,
};
pub use reservation::{CapacityReservation, Reservation};
pub use spawn::Spawn;
pub use store::{
    HolderKey, IncrementOutcome, NewSkill, RegistryStore, Skill, SkillFilter, Student,
    StudentPatch,
};
