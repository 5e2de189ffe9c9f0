//! Dashboard engine orchestrator.
//!
//! Builds the complete per-teacher view: course list, roster, per-student
//! aggregation fan-out, and risk classification. One student's store failure
//! degrades that row only; the rest of the batch completes. Only a failure to
//! fetch the teacher's course list aborts the whole build.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::aggregate::{course_summary, student_overview};
use crate::cache::SessionCache;
use crate::error::StoreError;
use crate::model::{
    CourseMetrics, CourseRecord, RiskAssessment, StudentMetrics, StudentRecord, StudentRow,
    TeacherView,
};
use crate::risk::RiskEngine;
use crate::traits::{RecordStore, RecordStoreExt};

/// Configuration for the dashboard engine.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Maximum concurrent per-student aggregations.
    pub parallelism: usize,
    /// Cached values older than this are recomputed.
    pub cache_ttl: Duration,
    /// Grade level assumed when a student record carries none.
    pub default_grade_level: u8,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            parallelism: 8,
            cache_ttl: Duration::from_secs(300),
            default_grade_level: 12,
        }
    }
}

/// The central dashboard engine.
pub struct DashboardEngine {
    store: Arc<dyn RecordStore>,
    risk: Arc<RiskEngine>,
    cache: Arc<SessionCache>,
    config: DashboardConfig,
}

impl DashboardEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        risk: Arc<RiskEngine>,
        cache: Arc<SessionCache>,
        config: DashboardConfig,
    ) -> Self {
        Self {
            store,
            risk,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn risk(&self) -> &RiskEngine {
        &self.risk
    }

    /// Build the full view for one teacher.
    ///
    /// Rows come back sorted by student id so repeated builds are directly
    /// comparable.
    pub async fn build_teacher_view(&self, teacher_id: &str) -> Result<TeacherView> {
        let start = Instant::now();

        let remote = self.risk.check_health().await;
        tracing::info!(teacher_id, remote_predictor = remote, "building teacher view");

        self.cache.evict_stale(teacher_id, &[], self.config.cache_ttl);

        let courses = self
            .cache
            .teacher_courses
            .get_or_compute(teacher_id.to_string(), || async {
                self.store.courses_for_teacher(teacher_id).await
            })
            .await
            .with_context(|| format!("failed to load courses for teacher {teacher_id}"))?;

        let roster = self
            .cache
            .teacher_roster
            .get_or_compute(teacher_id.to_string(), || self.load_roster(&courses))
            .await
            .with_context(|| format!("failed to load roster for teacher {teacher_id}"))?;

        let roster_ids: Vec<String> = roster.iter().map(|s| s.id.clone()).collect();
        self.cache
            .evict_stale(teacher_id, &roster_ids, self.config.cache_ttl);

        let courses_by_id: HashMap<&str, &CourseRecord> =
            courses.iter().map(|c| (c.id.as_str(), c)).collect();

        let semaphore = Arc::new(Semaphore::new(self.config.parallelism));
        let mut futures = FuturesUnordered::new();

        for student in &roster {
            let semaphore = Arc::clone(&semaphore);
            let courses_by_id = &courses_by_id;
            futures.push(async move {
                let outcome = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| StoreError::Unavailable("semaphore closed".into()))?;

                    let metrics = self
                        .cache
                        .student_metrics
                        .get_or_compute(student.id.clone(), || {
                            self.student_metrics(student, courses_by_id)
                        })
                        .await?;
                    let risk = self.risk.assess(&metrics).await;
                    Ok::<_, StoreError>((metrics, risk))
                }
                .await;
                (student, outcome)
            });
        }

        let mut students = Vec::with_capacity(roster.len());
        let mut degraded_count = 0usize;

        while let Some((student, outcome)) = futures.next().await {
            match outcome {
                Ok((metrics, risk)) => {
                    students.push(StudentRow {
                        student_id: student.id.clone(),
                        student_name: student.display_name(),
                        overview: metrics.overview,
                        courses: metrics.courses.into_iter().map(|c| c.summary).collect(),
                        risk,
                        degraded: false,
                    });
                }
                Err(e) => {
                    tracing::error!(student_id = %student.id, "student aggregation failed: {e}");
                    degraded_count += 1;
                    students.push(StudentRow {
                        student_id: student.id.clone(),
                        student_name: student.display_name(),
                        overview: Default::default(),
                        courses: vec![],
                        risk: RiskAssessment::unknown(format!("data unavailable: {e}")),
                        degraded: true,
                    });
                }
            }
        }
        drop(futures);

        students.sort_by(|a, b| a.student_id.cmp(&b.student_id));

        let elapsed = start.elapsed();
        tracing::info!(
            teacher_id,
            students = students.len(),
            degraded = degraded_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "teacher view complete"
        );

        Ok(TeacherView {
            id: Uuid::new_v4(),
            teacher_id: teacher_id.to_string(),
            generated_at: Utc::now(),
            courses,
            students,
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    /// Collect the unique students enrolled in any of the given courses.
    ///
    /// A student id with no user record gets a placeholder entry rather than
    /// dropping silently from the roster; a store failure on one lookup does
    /// the same.
    async fn load_roster(&self, courses: &[CourseRecord]) -> Result<Vec<StudentRecord>, StoreError> {
        let mut student_ids = BTreeSet::new();
        for course in courses {
            let enrollments = self.store.enrollments_for_course(&course.id).await?;
            student_ids.extend(enrollments.into_iter().map(|e| e.student_id));
        }

        let mut roster = Vec::with_capacity(student_ids.len());
        for id in student_ids {
            let record = match self.store.student(&id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::warn!(student_id = %id, "enrolled student has no user record");
                    placeholder_student(&id)
                }
                Err(e) => {
                    tracing::warn!(student_id = %id, "user record fetch failed: {e}");
                    placeholder_student(&id)
                }
            };
            roster.push(record);
        }
        Ok(roster)
    }

    /// Aggregate one student's metrics across all of their enrollments that
    /// belong to this teacher's courses.
    ///
    /// An enrollment whose module or assignment fetch fails is excluded from
    /// the student's averages; only a failure to enumerate the enrollments
    /// themselves (or losing every enrollment) degrades the whole student.
    async fn student_metrics(
        &self,
        student: &StudentRecord,
        courses_by_id: &HashMap<&str, &CourseRecord>,
    ) -> Result<StudentMetrics, StoreError> {
        let enrollments = self.store.enrollments_for_student(&student.id).await?;

        let mut course_metrics = Vec::new();
        let mut first_failure: Option<StoreError> = None;
        for enrollment in enrollments
            .iter()
            .filter(|e| courses_by_id.contains_key(e.course_id.as_str()))
        {
            let (modules, assignments) = tokio::join!(
                self.store.modules_for_enrollment(&enrollment.id),
                self.store.assignments_for_enrollment(&enrollment.id),
            );
            let (modules, assignments) = match (modules, assignments) {
                (Ok(modules), Ok(assignments)) => (modules, assignments),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(
                        student_id = %student.id,
                        enrollment_id = %enrollment.id,
                        "excluding enrollment, progress fetch failed: {e}"
                    );
                    first_failure.get_or_insert(e);
                    continue;
                }
            };

            let course = courses_by_id.get(enrollment.course_id.as_str()).copied();
            let summary = course_summary(enrollment, course, &modules, &assignments);
            course_metrics.push(CourseMetrics {
                summary,
                assignments,
            });
        }

        // No usable enrollment survived; the row carries no real data.
        if course_metrics.is_empty() {
            if let Some(e) = first_failure {
                return Err(e);
            }
        }

        let summaries: Vec<_> = course_metrics.iter().map(|c| c.summary.clone()).collect();
        Ok(StudentMetrics {
            student_id: student.id.clone(),
            grade_level: student.grade_level.unwrap_or(self.config.default_grade_level),
            overview: student_overview(&summaries, Utc::now()),
            courses: course_metrics,
        })
    }
}

fn placeholder_student(id: &str) -> StudentRecord {
    StudentRecord {
        id: id.to_string(),
        name: None,
        email: None,
        grade_level: None,
    }
}
