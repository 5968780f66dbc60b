//! Admission workflow engine: application state machine, capacity ledger,
//! schedule allocation, and the orchestrating service that ties them into
//! the admin-facing operations.
//!
//! The ledger is the single source of truth for seat and slot counts; every
//! reservation, release, and transfer is serialized per resource so the
//! invariant `used <= capacity` holds under concurrent admin actions.

pub mod allocator;
pub mod catalog;
pub mod domain;
pub mod ledger;
pub mod repository;
pub mod router;
pub mod scores;
pub mod service;
pub mod state;

#[cfg(test)]
mod tests;

pub use allocator::{AllocationError, AllocationTarget, Allocator};
pub use catalog::{CatalogError, ResourceCatalog};
pub use domain::{
    Actor, AdmissionStatus, ApplicantId, Application, ApplicationId, Assignment, AssignmentId,
    AssignmentStatus, CapacitySnapshot, CourseDetails, ResourceId, ResourceKey, ResourceKind,
    ResourceSpec, ScheduleDetails, ScoreRecord, StatusHistoryRecord, Venue, VenueId,
};
pub use ledger::{
    CapacityLedger, LedgerAction, LedgerAuditEntry, LedgerError, Reservation, ResourceState,
};
pub use repository::{
    ApplicationRecord, ApplicationRepository, ApplicationStatusView, NotificationError,
    NotificationPublisher, RepositoryError, StageEvent,
};
pub use router::admission_router;
pub use scores::{
    parse_score_sheet, validate_stanine, write_score_template, InvalidStanine, ScoreImportError,
    ScoreImportSummary, ScoreRow, ScoreRowFailure, SCORE_TEMPLATE_HEADERS,
};
pub use service::{
    AdmissionService, AdmissionServiceError, RetryPolicy, ScheduleSelection, SweepSummary,
};
pub use state::{transition, AdmissionEvent, StateTransitionError};
