//! Core data model types for classpulse.
//!
//! Two families live here: the raw records read from the document store
//! (optional-field heavy, serde-renamed to the store's camelCase contract
//! surface) and the derived aggregates handed to the presentation layer
//! (`CourseSummary`, `StudentOverview`, `RiskAssessment`, `TeacherView`).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// The record kinds the document store serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    User,
    Enrollment,
    Course,
    Module,
    Assignment,
    Progress,
}

impl RecordKind {
    /// Collection name used by the store facade.
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::User => "users",
            RecordKind::Enrollment => "enrollments",
            RecordKind::Course => "courses",
            RecordKind::Module => "modules",
            RecordKind::Assignment => "assignments",
            RecordKind::Progress => "progress",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordKind::User => "user",
            RecordKind::Enrollment => "enrollment",
            RecordKind::Course => "course",
            RecordKind::Module => "module",
            RecordKind::Assignment => "assignment",
            RecordKind::Progress => "progress",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "users" | "student" => Ok(RecordKind::User),
            "enrollment" | "enrollments" => Ok(RecordKind::Enrollment),
            "course" | "courses" => Ok(RecordKind::Course),
            "module" | "modules" => Ok(RecordKind::Module),
            "assignment" | "assignments" => Ok(RecordKind::Assignment),
            "progress" => Ok(RecordKind::Progress),
            other => Err(format!("unknown record kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// A store timestamp in one of three states: present and parseable, present
/// but unparseable, or absent entirely.
///
/// The store writes timestamps as RFC 3339 strings but older records carry
/// free-form values. Deserialization never fails on a bad timestamp; it
/// degrades to `Unparseable` so the aggregator and risk engine can treat the
/// state explicitly instead of mistaking it for recent activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timestamp {
    At(DateTime<Utc>),
    Unparseable,
    #[default]
    Missing,
}

impl Timestamp {
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::At(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Timestamp::Missing)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp::At(dt)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Timestamp::At(dt) => serializer.serialize_some(&dt.to_rfc3339()),
            Timestamp::Unparseable => serializer.serialize_some("unparseable"),
            Timestamp::Missing => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw {
            None => Timestamp::Missing,
            Some(s) => match DateTime::parse_from_rfc3339(&s) {
                Ok(dt) => Timestamp::At(dt.with_timezone(&Utc)),
                Err(_) => Timestamp::Unparseable,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Raw store records
// ---------------------------------------------------------------------------

/// A student (user) record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub grade_level: Option<u8>,
}

impl StudentRecord {
    /// Display name, falling back to the id when the record has none.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.clone())
    }
}

/// A course record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subject_area: Option<String>,
    #[serde(default)]
    pub teacher_id: Option<String>,
}

/// Links one student to one course.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRecord {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
}

/// Per-module progress within one enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgressRecord {
    pub id: String,
    #[serde(default)]
    pub enrollment_id: Option<String>,
    /// Completion percentage, 0–100. `None` means no progress recorded.
    #[serde(default)]
    pub completion: Option<f64>,
    /// Expertise percentage, 0–100. `None` means no progress recorded.
    #[serde(default)]
    pub expertise_rate: Option<f64>,
    #[serde(default)]
    pub last_accessed: Timestamp,
}

impl ModuleProgressRecord {
    /// A module with neither completion nor expertise has no progress record
    /// and is excluded from aggregation denominators.
    pub fn has_progress(&self) -> bool {
        self.completion.is_some() || self.expertise_rate.is_some()
    }
}

/// An assignment within one enrollment, with optional embedded progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    pub id: String,
    #[serde(default)]
    pub enrollment_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub progress: Option<ProgressRecord>,
}

impl AssignmentRecord {
    /// Submitted means a submission timestamp is present and parseable.
    pub fn is_submitted(&self) -> bool {
        self.progress
            .as_ref()
            .is_some_and(|p| p.submitted_at.as_datetime().is_some())
    }
}

/// Assignment progress: score, time spent, submission state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Score 0–100. `None` when unsubmitted or ungraded.
    #[serde(default)]
    pub total_score: Option<f64>,
    /// Time spent in minutes. Negative wire values are clamped to 0 at
    /// aggregation time.
    #[serde(default)]
    pub total_time: Option<f64>,
    #[serde(default)]
    pub submitted_at: Timestamp,
    #[serde(default)]
    pub is_late: Option<bool>,
}

/// Typed union over everything the store can return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    User(StudentRecord),
    Enrollment(EnrollmentRecord),
    Course(CourseRecord),
    Module(ModuleProgressRecord),
    Assignment(AssignmentRecord),
    Progress(ProgressRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::User(_) => RecordKind::User,
            Record::Enrollment(_) => RecordKind::Enrollment,
            Record::Course(_) => RecordKind::Course,
            Record::Module(_) => RecordKind::Module,
            Record::Assignment(_) => RecordKind::Assignment,
            Record::Progress(_) => RecordKind::Progress,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived aggregates
// ---------------------------------------------------------------------------

/// Derived per-enrollment aggregate of a student's progress within one course.
///
/// Invariants: percentage fields are clamped to [0, 100]; empty underlying
/// collections produce 0 rates, never NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub course_id: String,
    pub course_name: String,
    pub overall_score: f64,
    pub completion_rate: f64,
    pub submission_rate: f64,
    pub total_assignments: u32,
    pub missing_assignments: u32,
    pub total_time_minutes: f64,
    pub last_accessed: Timestamp,
}

/// When the student last touched any course material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "days")]
pub enum LastAccess {
    DaysAgo(u32),
    /// A timestamp exists somewhere but could not be parsed.
    Unparseable,
    /// No access timestamp exists on any record.
    Never,
}

/// Student-level rollup across all enrolled courses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOverview {
    pub course_count: u32,
    pub average_score: f64,
    pub completion_rate: f64,
    pub submission_rate: f64,
    pub missing_assignments: u32,
    pub last_access: LastAccess,
}

impl Default for StudentOverview {
    fn default() -> Self {
        Self {
            course_count: 0,
            average_score: 0.0,
            completion_rate: 0.0,
            submission_rate: 0.0,
            missing_assignments: 0,
            last_access: LastAccess::Never,
        }
    }
}

/// Aggregated input to the risk engine for one student.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMetrics {
    pub student_id: String,
    pub grade_level: u8,
    pub overview: StudentOverview,
    pub courses: Vec<CourseMetrics>,
}

/// Per-course slice of [`StudentMetrics`], retaining the raw assignment
/// progress the prediction service wants alongside the derived summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseMetrics {
    pub summary: CourseSummary,
    pub assignments: Vec<AssignmentRecord>,
}

// ---------------------------------------------------------------------------
// Risk assessment
// ---------------------------------------------------------------------------

/// Canonical risk buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    /// Assessment could not be produced at all (degraded student row).
    Unknown,
}

impl RiskLevel {
    /// Canonical score bucketing: <40 low, 40–69 medium, ≥70 high.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=39 => RiskLevel::Low,
            40..=69 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    /// Lenient parse of the prediction service's level strings
    /// (e.g. "High Risk", "Moderate Risk", "Minimal Risk").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        if lower.contains("high") {
            Ok(RiskLevel::High)
        } else if lower.contains("medium") || lower.contains("moderate") {
            Ok(RiskLevel::Medium)
        } else if lower.contains("low") || lower.contains("minimal") {
            Ok(RiskLevel::Low)
        } else {
            Err(format!("unknown risk level: {s}"))
        }
    }
}

/// How much to trust an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        write!(f, "{s}")
    }
}

/// Normalized risk classification for one student.
///
/// The shape is identical regardless of whether the remote predictor or the
/// rule-based fallback produced it; `fallback` records which path ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub score: u8,
    pub level: RiskLevel,
    pub is_at_risk: bool,
    pub factors: Vec<String>,
    pub confidence: Confidence,
    pub fallback: bool,
}

impl RiskAssessment {
    /// Placeholder assessment for a student whose data could not be fetched.
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            score: 0,
            level: RiskLevel::Unknown,
            is_at_risk: false,
            factors: vec![reason.into()],
            confidence: Confidence::Low,
            fallback: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Teacher view
// ---------------------------------------------------------------------------

/// One student's entry in a teacher view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub student_id: String,
    pub student_name: String,
    pub overview: StudentOverview,
    pub courses: Vec<CourseSummary>,
    pub risk: RiskAssessment,
    /// True when this row was defaulted because the student's data could not
    /// be fetched or aggregated.
    pub degraded: bool,
}

/// The complete per-teacher data set handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherView {
    pub id: Uuid,
    pub teacher_id: String,
    pub generated_at: DateTime<Utc>,
    pub courses: Vec<CourseRecord>,
    pub students: Vec<StudentRow>,
    pub duration_ms: u64,
}

impl TeacherView {
    /// Save the view as pretty-printed JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize view")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write view to {}", path.display()))?;
        Ok(())
    }

    /// Load a previously saved view.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read view from {}", path.display()))?;
        let view: TeacherView =
            serde_json::from_str(&content).context("failed to parse view JSON")?;
        Ok(view)
    }

    /// Number of students flagged at risk.
    pub fn at_risk_count(&self) -> usize {
        self.students.iter().filter(|s| s.risk.is_at_risk).count()
    }
}
