use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};

use crate::workflows::admission::catalog::ResourceCatalog;
use crate::workflows::admission::domain::{AdmissionStatus, ApplicantId, ApplicationId, ResourceKey};
use crate::workflows::admission::ledger::CapacityLedger;
use crate::workflows::admission::repository::{
    ApplicationRecord, ApplicationRepository, NotificationError, NotificationPublisher,
    RepositoryError, StageEvent,
};
use crate::workflows::admission::service::{AdmissionService, RetryPolicy, ScheduleSelection};

pub(super) fn test_ledger() -> Arc<CapacityLedger> {
    Arc::new(CapacityLedger::new(Duration::from_millis(250)))
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

/// Everything a workflow test needs: service, storage, ledger, and a small
/// seeded catalog (one venue, one course, two exam and two enrollment
/// schedules).
pub(super) struct TestEnv {
    pub(super) service: AdmissionService<MemoryRepository, MemoryNotifier>,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) notifier: Arc<MemoryNotifier>,
    pub(super) ledger: Arc<CapacityLedger>,
    pub(super) catalog: ResourceCatalog,
    pub(super) course: ResourceKey,
    pub(super) exam_small: ResourceKey,
    pub(super) exam_large: ResourceKey,
    pub(super) enrollment_early: ResourceKey,
    pub(super) enrollment_late: ResourceKey,
}

pub(super) fn build_env() -> TestEnv {
    let ledger = test_ledger();
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let service = AdmissionService::new(
        repository.clone(),
        notifier.clone(),
        ledger.clone(),
        RetryPolicy::default(),
    );
    let catalog = ResourceCatalog::new(ledger.clone());

    let venue = catalog.add_venue("Main Hall", 100).expect("venue");
    let course = catalog.add_course("BSIT", "Information Technology", 10).expect("course");
    let exam_small = catalog
        .add_exam_schedule(date(2026, 9, 1), time(8, 0), time(11, 0), &venue.id, 2)
        .expect("exam schedule");
    let exam_large = catalog
        .add_exam_schedule(date(2026, 9, 2), time(8, 0), time(11, 0), &venue.id, 5)
        .expect("exam schedule");
    let enrollment_early = catalog
        .add_enrollment_schedule(
            &course.id,
            date(2026, 9, 10),
            time(13, 0),
            time(16, 0),
            &venue.id,
            3,
            true,
        )
        .expect("enrollment schedule");
    let enrollment_late = catalog
        .add_enrollment_schedule(
            &course.id,
            date(2026, 9, 11),
            time(13, 0),
            time(16, 0),
            &venue.id,
            3,
            true,
        )
        .expect("enrollment schedule");

    TestEnv {
        service,
        repository,
        notifier,
        ledger,
        catalog,
        course,
        exam_small,
        exam_large,
        enrollment_early,
        enrollment_late,
    }
}

static APPLICANT_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

pub(super) fn next_applicant() -> ApplicantId {
    let n = APPLICANT_COUNTER.fetch_add(1, Ordering::Relaxed);
    ApplicantId(format!("stu-{n:05}"))
}

pub(super) fn submitted(env: &TestEnv) -> ApplicationId {
    env.service
        .submit_application(next_applicant())
        .expect("submission accepted")
        .application
        .id
}

pub(super) fn verified(env: &TestEnv) -> ApplicationId {
    let id = submitted(env);
    env.service
        .verify_application(&id, None, "registrar")
        .expect("verification accepted");
    id
}

pub(super) fn exam_scheduled(env: &TestEnv) -> ApplicationId {
    let id = verified(env);
    env.service
        .schedule_exam(&id, &ScheduleSelection::Auto, "registrar")
        .expect("exam scheduled");
    id
}

pub(super) fn scored(env: &TestEnv) -> ApplicationId {
    let id = exam_scheduled(env);
    env.service
        .post_score(&id, 7, "proctor")
        .expect("score posted");
    id
}

pub(super) fn course_assigned(env: &TestEnv) -> ApplicationId {
    let id = scored(env);
    env.service
        .assign_course(&id, &env.course.id, "dean")
        .expect("course assigned");
    id
}

pub(super) fn enrollment_scheduled(env: &TestEnv) -> ApplicationId {
    let id = course_assigned(env);
    env.service
        .schedule_enrollment(&id, &ScheduleSelection::Auto, "registrar")
        .expect("enrollment scheduled");
    id
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
    fail_updates: Arc<AtomicBool>,
}

impl MemoryRepository {
    /// Make every subsequent `update` fail, for compensation tests.
    pub(super) fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

impl ApplicationRepository for MemoryRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.application.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("storage offline".to_string()));
        }
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(record.application.id.clone(), record);
        Ok(())
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
pub(super) struct MemoryNotifier {
    events: Arc<Mutex<Vec<StageEvent>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<StageEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, event: StageEvent) -> Result<(), NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("smtp down".to_string()));
        }
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) fn admission_router_with_service(
    service: AdmissionService<MemoryRepository, MemoryNotifier>,
) -> axum::Router {
    crate::workflows::admission::admission_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("storage offline".to_string()))
    }

    fn update(&self, _record: ApplicationRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("storage offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("storage offline".to_string()))
    }

    fn fetch_by_control_number(
        &self,
        _control_number: &str,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("storage offline".to_string()))
    }

    fn with_status(
        &self,
        _status: AdmissionStatus,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("storage offline".to_string()))
    }

    fn active_for_applicant(
        &self,
        _applicant_id: &ApplicantId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("storage offline".to_string()))
    }
}
