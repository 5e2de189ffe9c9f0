//! Metric aggregation: raw progress records to course and student rollups.
//!
//! All functions here are pure. Defaulting rules for the store's optional
//! fields live in this module and nowhere else: a module with no progress
//! record is excluded from denominators rather than counted as zero, an
//! assignment is "submitted" only when a parseable submission timestamp
//! exists, and every percentage output is clamped to [0, 100]. Empty inputs
//! produce zeroed summaries, never NaN and never `None`.

use chrono::{DateTime, Utc};

use crate::model::{
    AssignmentRecord, CourseRecord, CourseSummary, EnrollmentRecord, LastAccess,
    ModuleProgressRecord, StudentOverview, Timestamp,
};

const SECONDS_PER_DAY: i64 = 86_400;

fn clamp_pct(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Derive a [`CourseSummary`] for one enrollment from its module and
/// assignment progress records. Inputs are never mutated.
pub fn course_summary(
    enrollment: &EnrollmentRecord,
    course: Option<&CourseRecord>,
    modules: &[ModuleProgressRecord],
    assignments: &[AssignmentRecord],
) -> CourseSummary {
    // Module accumulation. Only modules with any progress record enter the
    // completion denominator.
    let mut completion_sum = 0.0;
    let mut progressed_modules = 0usize;
    let mut score_sum = 0.0;
    let mut score_count = 0usize;
    let mut latest = Timestamp::Missing;

    for module in modules {
        if module.has_progress() {
            progressed_modules += 1;
            completion_sum += clamp_pct(module.completion.unwrap_or(0.0));
        }
        if let Some(expertise) = module.expertise_rate {
            score_sum += clamp_pct(expertise);
            score_count += 1;
        }
        latest = max_timestamp(latest, module.last_accessed);
    }

    // Assignment accumulation. "Submitted" requires a parseable timestamp.
    let total_assignments = assignments.len() as u32;
    let mut submitted = 0u32;
    let mut time_sum = 0.0;

    for assignment in assignments {
        if assignment.is_submitted() {
            submitted += 1;
        }
        if let Some(progress) = &assignment.progress {
            if let Some(score) = progress.total_score {
                score_sum += clamp_pct(score);
                score_count += 1;
            }
            time_sum += progress.total_time.unwrap_or(0.0).max(0.0);
            latest = max_timestamp(latest, progress.submitted_at);
        }
    }

    let submission_rate = if total_assignments == 0 {
        0.0
    } else {
        f64::from(submitted) / f64::from(total_assignments) * 100.0
    };

    CourseSummary {
        course_id: enrollment.course_id.clone(),
        course_name: course
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| enrollment.course_id.clone()),
        overall_score: clamp_pct(mean(score_sum, score_count)),
        completion_rate: clamp_pct(mean(completion_sum, progressed_modules)),
        submission_rate: clamp_pct(submission_rate),
        total_assignments,
        missing_assignments: total_assignments - submitted,
        total_time_minutes: time_sum,
        last_accessed: latest,
    }
}

/// Roll course summaries up into a student-level overview by arithmetic mean.
///
/// Enrollments whose summary could not be derived are simply absent from the
/// slice; the caller excludes them rather than zero-filling. Zero courses
/// yields an all-zero overview with `last_access = Never`.
pub fn student_overview(summaries: &[CourseSummary], now: DateTime<Utc>) -> StudentOverview {
    if summaries.is_empty() {
        return StudentOverview::default();
    }

    let count = summaries.len();
    let average_score = mean(summaries.iter().map(|s| s.overall_score).sum(), count);
    let completion_rate = mean(summaries.iter().map(|s| s.completion_rate).sum(), count);
    let submission_rate = mean(summaries.iter().map(|s| s.submission_rate).sum(), count);
    let missing_assignments = summaries.iter().map(|s| s.missing_assignments).sum();

    let mut latest = Timestamp::Missing;
    for summary in summaries {
        latest = max_timestamp(latest, summary.last_accessed);
    }

    StudentOverview {
        course_count: count as u32,
        average_score: clamp_pct(average_score),
        completion_rate: clamp_pct(completion_rate),
        submission_rate: clamp_pct(submission_rate),
        missing_assignments,
        last_access: last_access_from(latest, now),
    }
}

/// Convert the newest observed timestamp into the tri-state the risk engine
/// consumes. A timestamp in the future counts as zero days ago.
pub fn last_access_from(latest: Timestamp, now: DateTime<Utc>) -> LastAccess {
    match latest {
        Timestamp::At(dt) => {
            let days = (now - dt).num_seconds() / SECONDS_PER_DAY;
            LastAccess::DaysAgo(days.max(0) as u32)
        }
        Timestamp::Unparseable => LastAccess::Unparseable,
        Timestamp::Missing => LastAccess::Never,
    }
}

/// Newest of two timestamps. Parseable values always beat `Unparseable`,
/// which beats `Missing`.
fn max_timestamp(a: Timestamp, b: Timestamp) -> Timestamp {
    match (a, b) {
        (Timestamp::At(x), Timestamp::At(y)) => Timestamp::At(x.max(y)),
        (Timestamp::At(x), _) | (_, Timestamp::At(x)) => Timestamp::At(x),
        (Timestamp::Unparseable, _) | (_, Timestamp::Unparseable) => Timestamp::Unparseable,
        _ => Timestamp::Missing,
    }
}
