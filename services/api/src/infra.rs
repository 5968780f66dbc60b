use admission_core::workflows::admission::{
    AdmissionStatus, ApplicantId, ApplicationId, ApplicationRecord, ApplicationRepository,
    CatalogError, NotificationError, NotificationPublisher, RepositoryError, ResourceCatalog,
    ResourceKey, StageEvent,
};
use chrono::{NaiveDate, NaiveTime};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.application.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.application.id) {
            guard.insert(record.application.id.clone(), record);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn fetch_by_control_number(
        &self,
        control_number: &str,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|record| record.application.control_number == control_number)
            .cloned())
    }

    fn with_status(
        &self,
        status: AdmissionStatus,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut matching: Vec<ApplicationRecord> = guard
            .values()
            .filter(|record| record.application.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.application.id.cmp(&b.application.id));
        Ok(matching)
    }

    fn active_for_applicant(
        &self,
        applicant_id: &ApplicantId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|record| {
                &record.application.applicant_id == applicant_id
                    && record.application.status.is_active()
            })
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationPublisher {
    events: Arc<Mutex<Vec<StageEvent>>>,
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, event: StageEvent) -> Result<(), NotificationError> {
        let mut guard = self.events.lock().expect("notifier mutex poisoned");
        guard.push(event);
        Ok(())
    }
}

impl InMemoryNotificationPublisher {
    pub(crate) fn events(&self) -> Vec<StageEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

/// Resources created by [`seed_catalog`], kept so the demo can reference
/// them by key.
pub(crate) struct SeededResources {
    pub(crate) course: ResourceKey,
    pub(crate) exam_schedules: Vec<ResourceKey>,
    pub(crate) enrollment_schedules: Vec<ResourceKey>,
}

fn demo_date(month: u32, day: u32) -> Result<NaiveDate, CatalogError> {
    NaiveDate::from_ymd_opt(2026, month, day)
        .ok_or_else(|| CatalogError::Validation(format!("invalid seed date {month}-{day}")))
}

fn demo_time(hour: u32) -> Result<NaiveTime, CatalogError> {
    NaiveTime::from_hms_opt(hour, 0, 0)
        .ok_or_else(|| CatalogError::Validation(format!("invalid seed time {hour}:00")))
}

/// Seed the catalog with one venue, one course, and a pair of exam and
/// enrollment schedules so the service is usable out of the box.
pub(crate) fn seed_catalog(
    catalog: &ResourceCatalog,
    course_seats: u32,
) -> Result<SeededResources, CatalogError> {
    let venue = catalog.add_venue("Main Gymnasium", 300)?;
    let course = catalog.add_course("BSIT", "Bachelor of Science in Information Technology", course_seats)?;

    let mut exam_schedules = Vec::new();
    for day in [7, 8] {
        exam_schedules.push(catalog.add_exam_schedule(
            demo_date(9, day)?,
            demo_time(8)?,
            demo_time(11)?,
            &venue.id,
            150,
        )?);
    }

    let mut enrollment_schedules = Vec::new();
    let per_schedule = (course_seats / 2).max(1);
    for day in [21, 22] {
        enrollment_schedules.push(catalog.add_enrollment_schedule(
            &course.id,
            demo_date(9, day)?,
            demo_time(13)?,
            demo_time(16)?,
            &venue.id,
            per_schedule,
            true,
        )?);
    }

    Ok(SeededResources {
        course,
        exam_schedules,
        enrollment_schedules,
    })
}
