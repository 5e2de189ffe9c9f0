//! In-memory mocks for testing the dashboard engine without real services.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use classpulse_core::error::{PredictError, StoreError};
use classpulse_core::model::{Record, RecordKind};
use classpulse_core::traits::{
    PredictRequest, Prediction, RecordStore, RiskPredictor, ServiceHealth,
};

/// An in-memory [`RecordStore`] seeded with scripted records.
///
/// Queries match on the same field names the REST facade understands.
/// Failures can be injected per query value to exercise degradation paths.
#[derive(Default)]
pub struct MockStore {
    records: Mutex<Vec<Record>>,
    fail_query_values: Mutex<Vec<String>>,
    unavailable: AtomicBool,
    call_count: AtomicU32,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: Record) {
        self.records.lock().unwrap().push(record);
    }

    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        store.records.lock().unwrap().extend(records);
        store
    }

    /// Any query whose value equals `value` fails with a transient error.
    pub fn fail_queries_for(&self, value: &str) {
        self.fail_query_values.lock().unwrap().push(value.to_string());
    }

    /// Make every call fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Number of `get` and `query` calls made.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            Err(StoreError::Unavailable("mock store offline".into()))
        } else {
            Ok(())
        }
    }
}

fn record_id(record: &Record) -> Option<&str> {
    match record {
        Record::User(r) => Some(&r.id),
        Record::Enrollment(r) => Some(&r.id),
        Record::Course(r) => Some(&r.id),
        Record::Module(r) => Some(&r.id),
        Record::Assignment(r) => Some(&r.id),
        Record::Progress(_) => None,
    }
}

fn field_value(record: &Record, field: &str) -> Option<String> {
    match (record, field) {
        (Record::Course(c), "teacherId") => c.teacher_id.clone(),
        (Record::Enrollment(e), "courseId") => Some(e.course_id.clone()),
        (Record::Enrollment(e), "studentId") => Some(e.student_id.clone()),
        (Record::Module(m), "enrollmentId") => m.enrollment_id.clone(),
        (Record::Assignment(a), "enrollmentId") => a.enrollment_id.clone(),
        _ => None,
    }
}

#[async_trait]
impl RecordStore for MockStore {
    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StoreError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.kind() == kind && record_id(r) == Some(id))
            .cloned())
    }

    async fn query(
        &self,
        kind: RecordKind,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        if self
            .fail_query_values
            .lock()
            .unwrap()
            .iter()
            .any(|v| v == value)
        {
            return Err(StoreError::Unavailable("mock query failure".into()));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind() == kind && field_value(r, field).as_deref() == Some(value))
            .cloned()
            .collect())
    }
}

/// A mock [`RiskPredictor`] returning a fixed prediction, or scripted
/// failures.
pub struct MockPredictor {
    prediction: Mutex<Option<Prediction>>,
    healthy: AtomicBool,
    call_count: AtomicU32,
    last_request: Mutex<Option<PredictRequest>>,
}

impl MockPredictor {
    /// A healthy predictor that always returns `prediction`.
    pub fn with_prediction(prediction: Prediction) -> Self {
        Self {
            prediction: Mutex::new(Some(prediction)),
            healthy: AtomicBool::new(true),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A predictor whose every call fails.
    pub fn offline() -> Self {
        Self {
            prediction: Mutex::new(None),
            healthy: AtomicBool::new(false),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<PredictRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl RiskPredictor for MockPredictor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn predict(&self, request: &PredictRequest) -> Result<Prediction, PredictError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.prediction
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PredictError::Network("mock predictor offline".into()))
    }

    async fn health(&self) -> Result<ServiceHealth, PredictError> {
        if self.healthy.load(Ordering::Relaxed) {
            Ok(ServiceHealth {
                status: "healthy".into(),
                model_loaded: true,
            })
        } else {
            Err(PredictError::Network("mock predictor offline".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classpulse_core::model::{EnrollmentRecord, StudentRecord};
    use classpulse_core::traits::RecordStoreExt;

    fn student(id: &str) -> Record {
        Record::User(StudentRecord {
            id: id.into(),
            name: None,
            email: None,
            grade_level: None,
        })
    }

    #[tokio::test]
    async fn store_filters_by_field() {
        let store = MockStore::with_records([
            student("s1"),
            Record::Enrollment(EnrollmentRecord {
                id: "e1".into(),
                student_id: "s1".into(),
                course_id: "c1".into(),
            }),
            Record::Enrollment(EnrollmentRecord {
                id: "e2".into(),
                student_id: "s2".into(),
                course_id: "c1".into(),
            }),
        ]);

        let enrollments = store.enrollments_for_course("c1").await.unwrap();
        assert_eq!(enrollments.len(), 2);
        let mine = store.enrollments_for_student("s1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(store.student("s1").await.unwrap().is_some());
        assert!(store.student("s9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scripted_query_failure() {
        let store = MockStore::with_records([student("s1")]);
        store.fail_queries_for("s1");
        let err = store.enrollments_for_student("s1").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn offline_predictor_fails_health_and_predict() {
        let predictor = MockPredictor::offline();
        assert!(predictor.health().await.is_err());
        let request = PredictRequest {
            student_id: "s1".into(),
            grade_level: 12,
            average_score: 50.0,
            completion_rate: 50.0,
            courses: vec![],
        };
        assert!(predictor.predict(&request).await.is_err());
        assert_eq!(predictor.call_count(), 1);
        assert_eq!(predictor.last_request().unwrap().student_id, "s1");
    }
}
