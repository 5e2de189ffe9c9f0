//! Trait definitions for the document store and the prediction service.
//!
//! These async traits are implemented by the `classpulse-remote` crate; the
//! engine depends only on the traits so tests can substitute mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PredictError, StoreError};
use crate::model::{
    AssignmentRecord, CourseRecord, EnrollmentRecord, ModuleProgressRecord, Record, RecordKind,
    StudentRecord,
};

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

/// Read-only access to the external document store.
///
/// Implementations perform no retries; retry/degradation policy belongs to
/// the orchestrator. `get` returns `Ok(None)` for absent records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a single record by id.
    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StoreError>;

    /// Fetch all records of `kind` whose `field` equals `value`.
    async fn query(
        &self,
        kind: RecordKind,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>, StoreError>;
}

/// Typed convenience wrappers over the raw `get`/`query` surface.
///
/// Records of an unexpected variant are dropped with a warning rather than
/// failing the whole query; a store that mixes kinds inside one collection is
/// a data problem, not a batch-fatal one.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    async fn student(&self, id: &str) -> Result<Option<StudentRecord>, StoreError> {
        Ok(self.get(RecordKind::User, id).await?.and_then(|r| match r {
            Record::User(s) => Some(s),
            other => {
                tracing::warn!(kind = %other.kind(), id, "expected user record, got mismatched kind");
                None
            }
        }))
    }

    async fn courses_for_teacher(&self, teacher_id: &str) -> Result<Vec<CourseRecord>, StoreError> {
        let records = self.query(RecordKind::Course, "teacherId", teacher_id).await?;
        Ok(filter_variant(records, |r| match r {
            Record::Course(c) => Some(c),
            _ => None,
        }))
    }

    async fn enrollments_for_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let records = self
            .query(RecordKind::Enrollment, "courseId", course_id)
            .await?;
        Ok(filter_variant(records, |r| match r {
            Record::Enrollment(e) => Some(e),
            _ => None,
        }))
    }

    async fn enrollments_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let records = self
            .query(RecordKind::Enrollment, "studentId", student_id)
            .await?;
        Ok(filter_variant(records, |r| match r {
            Record::Enrollment(e) => Some(e),
            _ => None,
        }))
    }

    async fn modules_for_enrollment(
        &self,
        enrollment_id: &str,
    ) -> Result<Vec<ModuleProgressRecord>, StoreError> {
        let records = self
            .query(RecordKind::Module, "enrollmentId", enrollment_id)
            .await?;
        Ok(filter_variant(records, |r| match r {
            Record::Module(m) => Some(m),
            _ => None,
        }))
    }

    async fn assignments_for_enrollment(
        &self,
        enrollment_id: &str,
    ) -> Result<Vec<AssignmentRecord>, StoreError> {
        let records = self
            .query(RecordKind::Assignment, "enrollmentId", enrollment_id)
            .await?;
        Ok(filter_variant(records, |r| match r {
            Record::Assignment(a) => Some(a),
            _ => None,
        }))
    }
}

impl<T: RecordStore + ?Sized> RecordStoreExt for T {}

fn filter_variant<T>(records: Vec<Record>, extract: impl Fn(Record) -> Option<T>) -> Vec<T> {
    let total = records.len();
    let typed: Vec<T> = records.into_iter().filter_map(&extract).collect();
    if typed.len() < total {
        tracing::warn!(
            dropped = total - typed.len(),
            "dropped records with mismatched kind from query result"
        );
    }
    typed
}

// ---------------------------------------------------------------------------
// Prediction service
// ---------------------------------------------------------------------------

/// Trait for the remote risk prediction service.
#[async_trait]
pub trait RiskPredictor: Send + Sync {
    /// Human-readable predictor name (e.g. "http").
    fn name(&self) -> &str;

    /// Submit aggregated metrics and get a risk prediction back.
    async fn predict(&self, request: &PredictRequest) -> Result<Prediction, PredictError>;

    /// Probe the service's health endpoint.
    async fn health(&self) -> Result<ServiceHealth, PredictError>;
}

/// Request body for `POST /predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    pub student_id: String,
    pub grade_level: u8,
    pub average_score: f64,
    pub completion_rate: f64,
    pub courses: Vec<PredictCourse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictCourse {
    pub id: String,
    pub name: String,
    pub assignments: Vec<PredictAssignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictAssignment {
    pub progress: PredictProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictProgress {
    pub total_score: f64,
    pub total_time: f64,
    pub is_late: bool,
}

/// Normalized prediction returned by a `RiskPredictor`.
///
/// `risk_score` is always present; a response without it is a
/// [`PredictError::Malformed`] at the implementation layer, never an empty
/// prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub risk_score: u8,
    /// The service's own level string, when it supplies one.
    pub risk_level: Option<String>,
    /// The service's explicit at-risk verdict, when it supplies one.
    pub is_at_risk: Option<bool>,
    /// Raw at-risk probability in [0, 1], when supplied.
    pub probability: Option<f64>,
    /// Intervention suggestions, merged into the assessment's factor list.
    pub suggestions: Vec<String>,
}

/// Response from `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub model_loaded: bool,
}

impl ServiceHealth {
    pub fn is_available(&self) -> bool {
        self.status == "healthy" && self.model_loaded
    }
}
