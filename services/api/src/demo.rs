use crate::infra::{
    seed_catalog, InMemoryApplicationRepository, InMemoryNotificationPublisher, SeededResources,
};
use admission_core::error::AppError;
use admission_core::workflows::admission::{
    write_score_template, AdmissionService, AdmissionServiceError, ApplicantId, CapacityLedger,
    LedgerError, ResourceCatalog, RetryPolicy, ScheduleSelection,
};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Number of applicants to walk through the pipeline.
    #[arg(long, default_value_t = 6)]
    pub(crate) applicants: u32,
    /// Seats in the demo course; applicants beyond this hit the capacity gate.
    #[arg(long, default_value_t = 4)]
    pub(crate) seats: u32,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ScoreTemplateArgs {
    /// Write the template to this file instead of stdout.
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn write_template(args: ScoreTemplateArgs) -> Result<(), AppError> {
    match args.output {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            write_score_template(file).map_err(AdmissionServiceError::from)?;
        }
        None => {
            let stdout = std::io::stdout();
            write_score_template(stdout.lock()).map_err(AdmissionServiceError::from)?;
        }
    }
    Ok(())
}

/// Walk a batch of applicants through the whole pipeline, letting the
/// capacity gate reject the overflow, then print what the ledger saw.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { applicants, seats } = args;

    let ledger = Arc::new(CapacityLedger::new(Duration::from_millis(250)));
    let catalog = ResourceCatalog::new(ledger.clone());
    let seeded = seed_catalog(&catalog, seats)?;
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let service = AdmissionService::new(
        Arc::new(InMemoryApplicationRepository::default()),
        notifier.clone(),
        ledger.clone(),
        RetryPolicy::default(),
    );

    println!("Admission pipeline demo: {applicants} applicants, {seats} course seats");
    let mut enrolled = 0u32;
    let mut rejected = 0u32;
    for n in 1..=applicants {
        let record = service.submit_application(ApplicantId(format!("demo-stu-{n:03}")))?;
        let id = record.application.id.clone();
        service.verify_application(&id, None, "registrar")?;
        service.schedule_exam(&id, &ScheduleSelection::Auto, "registrar")?;
        let stanine = (n % 9) as i64 + 1;
        service.post_score(&id, stanine, "proctor")?;

        match service.assign_course(&id, &seeded.course.id, "dean") {
            Ok(_) => {
                service.schedule_enrollment(&id, &ScheduleSelection::Auto, "registrar")?;
                service.complete_enrollment(&id, "registrar")?;
                enrolled += 1;
                println!(
                    "  {} ({}): enrolled with stanine {stanine}",
                    id.0, record.application.control_number
                );
            }
            Err(AdmissionServiceError::Ledger(LedgerError::CapacityExceeded { .. })) => {
                service.reject_application(&id, "no seats remaining in the program", "dean")?;
                rejected += 1;
                println!(
                    "  {} ({}): rejected, course is full",
                    id.0, record.application.control_number
                );
            }
            Err(err) => return Err(err.into()),
        }
    }

    println!("\nOutcome: {enrolled} enrolled, {rejected} rejected at the capacity gate");
    print_snapshots(&ledger, &seeded)?;
    println!(
        "\n{} stage notifications were published",
        notifier.events().len()
    );
    Ok(())
}

fn print_snapshots(ledger: &CapacityLedger, seeded: &SeededResources) -> Result<(), AppError> {
    println!("\nCapacity after the run:");
    let course = ledger
        .capacity_of(&seeded.course)
        .map_err(AdmissionServiceError::from)?;
    println!(
        "  course {}: {}/{} seats used",
        seeded.course.id.0, course.used, course.capacity
    );
    for key in seeded
        .exam_schedules
        .iter()
        .chain(seeded.enrollment_schedules.iter())
    {
        let snapshot = ledger
            .capacity_of(key)
            .map_err(AdmissionServiceError::from)?;
        println!(
            "  {} {}: {}/{} used",
            key.kind.label(),
            key.id.0,
            snapshot.used,
            snapshot.capacity
        );
    }

    let trail = ledger.audit_for(&seeded.course);
    println!("  course audit trail: {} counter mutations", trail.len());
    Ok(())
}
