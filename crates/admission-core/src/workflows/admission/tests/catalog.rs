use super::common::*;
use crate::workflows::admission::catalog::{CatalogError, ResourceCatalog};
use crate::workflows::admission::domain::VenueId;

#[test]
fn venue_registry_returns_what_was_added() {
    let catalog = ResourceCatalog::new(test_ledger());
    let hall = catalog.add_venue("Main Hall", 100).expect("venue");
    let annex = catalog.add_venue("Annex", 30).expect("venue");

    assert_eq!(catalog.venue(&hall.id).expect("lookup").name, "Main Hall");
    assert_eq!(catalog.venue(&annex.id).expect("lookup").capacity, 30);
    assert!(matches!(
        catalog.venue(&VenueId("venue-999".to_string())),
        Err(CatalogError::VenueNotFound(_))
    ));
}

#[test]
fn course_codes_must_be_unique() {
    let catalog = ResourceCatalog::new(test_ledger());
    catalog
        .add_course("BSIT", "Information Technology", 10)
        .expect("first course");

    match catalog.add_course("BSIT", "Info Tech, again", 5) {
        Err(CatalogError::Validation(message)) => {
            assert!(message.contains("BSIT"), "message: {message}")
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn schedule_capacity_may_not_exceed_the_venue() {
    let catalog = ResourceCatalog::new(test_ledger());
    let venue = catalog.add_venue("Annex", 30).expect("venue");

    match catalog.add_exam_schedule(date(2026, 9, 1), time(8, 0), time(11, 0), &venue.id, 31) {
        Err(CatalogError::Validation(message)) => {
            assert!(message.contains("30"), "message: {message}")
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    catalog
        .add_exam_schedule(date(2026, 9, 1), time(8, 0), time(11, 0), &venue.id, 30)
        .expect("capacity at the venue maximum is allowed");
}

#[test]
fn enrollment_schedule_capacity_is_bounded_by_open_course_seats() {
    let catalog = ResourceCatalog::new(test_ledger());
    let venue = catalog.add_venue("Main Hall", 100).expect("venue");
    let course = catalog
        .add_course("BSCS", "Computer Science", 4)
        .expect("course");

    match catalog.add_enrollment_schedule(
        &course.id,
        date(2026, 9, 10),
        time(13, 0),
        time(16, 0),
        &venue.id,
        5,
        true,
    ) {
        Err(CatalogError::Validation(message)) => {
            assert!(message.contains("4"), "message: {message}")
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    catalog
        .add_enrollment_schedule(
            &course.id,
            date(2026, 9, 10),
            time(13, 0),
            time(16, 0),
            &venue.id,
            4,
            true,
        )
        .expect("capacity within the open seats is allowed");
}

#[test]
fn capacity_edits_respect_the_venue_maximum() {
    let catalog = ResourceCatalog::new(test_ledger());
    let venue = catalog.add_venue("Annex", 50).expect("venue");
    let key = catalog
        .add_exam_schedule(date(2026, 9, 1), time(8, 0), time(11, 0), &venue.id, 20)
        .expect("exam schedule");

    assert!(matches!(
        catalog.update_capacity(&key, 60),
        Err(CatalogError::Validation(_))
    ));
    catalog
        .update_capacity(&key, 50)
        .expect("growth within the venue is allowed");
}
