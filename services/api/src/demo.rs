use chrono::{NaiveDate, Utc};
use clap::Args;
use mbkm_registration::config::ScheduleConfig;
use mbkm_registration::error::AppError;
use mbkm_registration::workflows::registration::{
    AccessToken, ActivityId, ActivityRecord, DirectoryFixtures, MemoryBackend, MemoryDirectory,
    RegistrationDraft, RegistrationService, ReportSchedule, ReviewDecision, TokenUser, UserRecord,
    ACTIVITY_OPEN_STATUS,
};
use serde::Serialize;

const STUDENT: &str = "demo-student";
const ADVISOR: &str = "demo-advisor";
const OTHER_ADVISOR: &str = "demo-other-advisor";
const PROGRAM_OFFICE: &str = "demo-lo";
const ADVISOR_EMAIL: &str = "dewi.lestari@kampus.ac.id";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Start date of the demo activity (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Duration of the demo activity in months.
    #[arg(long, default_value_t = 3)]
    pub(crate) months: i64,
    /// Print the generated schedule as JSON instead of a table.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
struct ScheduleRow {
    report_type: String,
    week: u32,
    start_date: String,
    end_date: String,
}

impl From<&ReportSchedule> for ScheduleRow {
    fn from(entry: &ReportSchedule) -> Self {
        Self {
            report_type: entry.report_type.to_string(),
            week: entry.week,
            start_date: entry.start_date.format("%Y-%m-%d").to_string(),
            end_date: entry.end_date.format("%Y-%m-%d").to_string(),
        }
    }
}

fn demo_fixtures(start: NaiveDate, months: i64) -> DirectoryFixtures {
    let start_period = format!("{}T00:00:00+07:00", start.format("%Y-%m-%d"));
    let activity = |id: &str, name: &str, status: &str, start_period: String| ActivityRecord {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        approval_status: Some(status.to_string()),
        start_period: Some(start_period),
        months_duration: Some(months),
    };
    let user = |token: &str, id: &str, name: &str, role: &str, nrp: Option<&str>, email: &str| {
        TokenUser {
            token: token.to_string(),
            user: UserRecord {
                id: Some(id.to_string()),
                nrp: nrp.map(str::to_string),
                name: Some(name.to_string()),
                role: Some(role.to_string()),
                email: Some(email.to_string()),
            },
        }
    };

    DirectoryFixtures {
        activities: vec![
            activity(
                "kampus-mengajar",
                "Kampus Mengajar",
                ACTIVITY_OPEN_STATUS,
                start_period.clone(),
            ),
            activity(
                "magang-industri",
                "Magang Industri",
                ACTIVITY_OPEN_STATUS,
                start_period,
            ),
        ],
        users: vec![
            user(
                STUDENT,
                "u-student",
                "Rina Putri",
                "MAHASISWA",
                Some("5025201001"),
                "rina@student.kampus.ac.id",
            ),
            user(
                ADVISOR,
                "u-advisor",
                "Dewi Lestari",
                "DOSEN PEMBIMBING",
                None,
                ADVISOR_EMAIL,
            ),
            user(
                OTHER_ADVISOR,
                "u-other-advisor",
                "Agus Salim",
                "DOSEN PEMBIMBING",
                None,
                "agus.salim@kampus.ac.id",
            ),
            user(
                PROGRAM_OFFICE,
                "u-lo",
                "Program Office",
                "LO-MBKM",
                None,
                "lo@kampus.ac.id",
            ),
        ],
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { start, months, json } = args;
    let start = start.unwrap_or_else(|| Utc::now().date_naive());

    let directory = MemoryDirectory::from_fixtures(demo_fixtures(start, months));
    let backend = MemoryBackend::with_directory(directory);
    let service = RegistrationService::new(backend.dependencies(), ScheduleConfig::default());
    let student = AccessToken::new(STUDENT);
    let activity = ActivityId("kampus-mengajar".to_string());

    println!("MBKM registration demo");
    println!("Activity: {activity} starting {start} for {months} month(s)");

    let verdict = service.check_eligibility(&activity, &student)?;
    println!("\n1. Eligibility check: {} ({})", verdict.message, verdict.eligible);

    let details = service.create_registration(
        RegistrationDraft {
            activity_id: activity.clone(),
            academic_advisor_id: "u-advisor".to_string(),
            advising_confirmation: true,
            academic_advisor: "Dewi Lestari".to_string(),
            academic_advisor_email: ADVISOR_EMAIL.to_string(),
            mentor_name: "Hendra Wijaya".to_string(),
            mentor_email: "hendra@mitra.co.id".to_string(),
            semester: 6,
            total_sks: 20,
            documents: Vec::new(),
        },
        &student,
    )?;
    let registration = details.registration;
    println!("2. Registration {} created", registration.id);

    let overlapping =
        service.check_eligibility(&ActivityId("magang-industri".to_string()), &student)?;
    println!(
        "3. Eligibility for an overlapping activity: {} ({})",
        overlapping.message, overlapping.eligible
    );

    let ids = [registration.id];
    let other_advisor = AccessToken::new(OTHER_ADVISOR);
    match service.advisor_approval(&ids, ReviewDecision::Approved, &other_advisor) {
        Ok(_) => println!("4. Unassigned advisor decision unexpectedly accepted"),
        Err(err) => println!("4. Unassigned advisor decision refused: {err}"),
    }

    let advisor_token = AccessToken::new(ADVISOR);
    let advisor = service.advisor_approval(&ids, ReviewDecision::Approved, &advisor_token)?;
    println!(
        "5. Advisor approved; approval status is now {}",
        advisor.updated.first().is_some_and(|r| r.approval_status)
    );

    match service.advisor_approval(&ids, ReviewDecision::Approved, &advisor_token) {
        Ok(_) => println!("6. Duplicate advisor approval unexpectedly accepted"),
        Err(err) => println!("6. Duplicate advisor approval refused: {err}"),
    }

    let office = service.lo_approval(
        &ids,
        ReviewDecision::Approved,
        &AccessToken::new(PROGRAM_OFFICE),
    )?;
    println!(
        "7. Program office approved; approval status is now {}, {} schedule(s) generated",
        office.updated.first().is_some_and(|r| r.approval_status),
        office.schedules_generated
    );

    let rows: Vec<ScheduleRow> = backend
        .monitoring
        .records_for(&registration.id)
        .iter()
        .map(ScheduleRow::from)
        .collect();

    println!("\nReport schedule ({} entries)", rows.len());
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            println!(
                "- {:<13} week {:>2}: {} .. {}",
                row.report_type, row.week, row.start_date, row.end_date
            );
        }
    }

    Ok(())
}
