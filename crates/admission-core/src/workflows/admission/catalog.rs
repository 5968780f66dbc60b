//! Administrator-facing management of long-lived resources: venues, courses,
//! exam schedules, and enrollment schedules. Validation lives here; the
//! counters themselves stay inside the ledger.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveTime};

use super::domain::{
    CourseDetails, ResourceId, ResourceKey, ResourceKind, ResourceSpec, ScheduleDetails, Venue,
    VenueId,
};
use super::ledger::{CapacityLedger, LedgerError, ResourceState};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),
    #[error("venue '{0}' not found")]
    VenueNotFound(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

static COURSE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static SCHEDULE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static VENUE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Resource catalog over the shared ledger, plus the venue registry.
pub struct ResourceCatalog {
    ledger: Arc<CapacityLedger>,
    venues: Mutex<BTreeMap<VenueId, Venue>>,
}

impl ResourceCatalog {
    pub fn new(ledger: Arc<CapacityLedger>) -> Self {
        Self {
            ledger,
            venues: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn add_venue(&self, name: impl Into<String>, capacity: u32) -> Result<Venue, CatalogError> {
        if capacity == 0 {
            return Err(CatalogError::Validation(
                "venue capacity must be at least 1".to_string(),
            ));
        }
        let id = VenueId(format!(
            "venue-{:03}",
            VENUE_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));
        let venue = Venue {
            id: id.clone(),
            name: name.into(),
            capacity,
        };
        self.venues
            .lock()
            .expect("venue registry poisoned")
            .insert(id, venue.clone());
        Ok(venue)
    }

    pub fn venue(&self, id: &VenueId) -> Result<Venue, CatalogError> {
        self.venues
            .lock()
            .expect("venue registry poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::VenueNotFound(id.0.clone()))
    }

    /// Register a course with a unique code.
    pub fn add_course(
        &self,
        code: impl Into<String>,
        name: impl Into<String>,
        capacity: u32,
    ) -> Result<ResourceKey, CatalogError> {
        let code = code.into();
        if capacity == 0 {
            return Err(CatalogError::Validation(
                "course capacity must be at least 1".to_string(),
            ));
        }
        let duplicate = self
            .ledger
            .states_of_kind(ResourceKind::Course)?
            .into_iter()
            .any(|state| matches!(&state.spec, ResourceSpec::Course(details) if details.code == code));
        if duplicate {
            return Err(CatalogError::Validation(format!(
                "course code '{code}' is already in use"
            )));
        }

        let id = format!("crs-{:04}", COURSE_SEQUENCE.fetch_add(1, Ordering::Relaxed));
        let key = self.ledger.define(
            id,
            ResourceSpec::Course(CourseDetails {
                code,
                name: name.into(),
            }),
            capacity,
        )?;
        Ok(key)
    }

    pub fn add_exam_schedule(
        &self,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        venue_id: &VenueId,
        capacity: u32,
    ) -> Result<ResourceKey, CatalogError> {
        let details = self.schedule_details(date, start_time, end_time, venue_id, capacity)?;
        let id = format!(
            "exam-{:04}",
            SCHEDULE_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        Ok(self
            .ledger
            .define(id, ResourceSpec::ExamSchedule(details), capacity)?)
    }

    /// Enrollment schedules belong to a course; their capacity may not
    /// exceed what the course still has open.
    #[allow(clippy::too_many_arguments)]
    pub fn add_enrollment_schedule(
        &self,
        course_id: &ResourceId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        venue_id: &VenueId,
        capacity: u32,
        auto_assign: bool,
    ) -> Result<ResourceKey, CatalogError> {
        let details = self.schedule_details(date, start_time, end_time, venue_id, capacity)?;

        let course_key = ResourceKey {
            kind: ResourceKind::Course,
            id: course_id.clone(),
        };
        // Advisory admin-time check against a snapshot; the ledger enforces
        // the hard capacity invariant under the row lock on every reserve.
        let course = self.ledger.capacity_of(&course_key)?;
        if course.available == 0 {
            return Err(CatalogError::Validation(format!(
                "cannot create enrollment schedule: course '{}' has no available slots",
                course_id.0
            )));
        }
        if capacity > course.available {
            return Err(CatalogError::Validation(format!(
                "schedule capacity ({capacity}) cannot exceed available slots ({}) for course '{}'",
                course.available, course_id.0
            )));
        }

        let id = format!(
            "enr-{:04}",
            SCHEDULE_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        Ok(self.ledger.define(
            id,
            ResourceSpec::EnrollmentSchedule {
                schedule: details,
                course_id: course_id.clone(),
                auto_assign,
            },
            capacity,
        )?)
    }

    /// Capacity edits go through the ledger so the reduction guard sees the
    /// committed count under the row lock.
    pub fn update_capacity(&self, key: &ResourceKey, capacity: u32) -> Result<(), CatalogError> {
        if capacity == 0 {
            return Err(CatalogError::Validation(
                "capacity must be at least 1".to_string(),
            ));
        }
        if key.kind != ResourceKind::Course {
            let state = self.ledger.state_of(key)?;
            if let Some(venue_id) = spec_venue(&state.spec) {
                let venue = self.venue(&venue_id)?;
                if capacity > venue.capacity {
                    return Err(CatalogError::Validation(format!(
                        "capacity cannot exceed venue '{}' maximum of {}",
                        venue.name, venue.capacity
                    )));
                }
            }
        }
        self.ledger.update_capacity(key, capacity)?;
        Ok(())
    }

    pub fn set_active(&self, key: &ResourceKey, active: bool) -> Result<(), CatalogError> {
        Ok(self.ledger.set_active(key, active)?)
    }

    /// Remove a resource; rejected by the ledger while committed assignments
    /// remain.
    pub fn remove(&self, key: &ResourceKey) -> Result<(), CatalogError> {
        Ok(self.ledger.remove(key)?)
    }

    pub fn list(&self, kind: ResourceKind) -> Result<Vec<ResourceState>, CatalogError> {
        Ok(self.ledger.states_of_kind(kind)?)
    }

    fn schedule_details(
        &self,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        venue_id: &VenueId,
        capacity: u32,
    ) -> Result<ScheduleDetails, CatalogError> {
        if capacity == 0 {
            return Err(CatalogError::Validation(
                "schedule capacity must be at least 1".to_string(),
            ));
        }
        if end_time <= start_time {
            return Err(CatalogError::Validation(
                "schedule end time must be after its start time".to_string(),
            ));
        }
        let venue = self.venue(venue_id)?;
        if capacity > venue.capacity {
            return Err(CatalogError::Validation(format!(
                "capacity cannot exceed venue '{}' maximum of {}",
                venue.name, venue.capacity
            )));
        }
        Ok(ScheduleDetails {
            date,
            start_time,
            end_time,
            venue_id: venue_id.clone(),
        })
    }
}

fn spec_venue(spec: &ResourceSpec) -> Option<VenueId> {
    match spec {
        ResourceSpec::Course(_) => None,
        ResourceSpec::ExamSchedule(details) => Some(details.venue_id.clone()),
        ResourceSpec::EnrollmentSchedule { schedule, .. } => Some(schedule.venue_id.clone()),
    }
}
