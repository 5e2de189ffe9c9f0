//! Risk engine: remote prediction with a deterministic rule-based fallback.
//!
//! Each assessment walks a small state machine: attempt the remote predictor,
//! and on any unavailability or malformed response fall back to the rule
//! table. Both paths produce the same normalized [`RiskAssessment`] shape so
//! callers never branch on the source. A lightweight availability flag lets
//! batch operations skip repeated remote attempts once the service has been
//! observed down; the flag is refreshed from the health endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::instrument;

use crate::model::{
    Confidence, LastAccess, RiskAssessment, RiskLevel, StudentMetrics,
};
use crate::traits::{
    PredictAssignment, PredictCourse, PredictProgress, PredictRequest, RiskPredictor,
};

/// What the fallback rule should assume when no access timestamp exists on
/// any record. Absence of evidence is not recent activity, so the policy is
/// an explicit caller decision rather than a hidden default per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoAccessPolicy {
    /// Treat "never accessed" like an unparseable timestamp (+15 points).
    AssumeUnparseable,
    /// Treat "never accessed" as if the last access were this many days ago.
    AssumeDays(u32),
}

/// Risk engine configuration.
#[derive(Debug, Clone)]
pub struct RiskEngineConfig {
    pub no_access_policy: NoAccessPolicy,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            no_access_policy: NoAccessPolicy::AssumeUnparseable,
        }
    }
}

/// Produces risk assessments from aggregated metrics.
pub struct RiskEngine {
    predictor: Arc<dyn RiskPredictor>,
    config: RiskEngineConfig,
    /// Cleared on the first failed remote attempt so the rest of a batch
    /// goes straight to the fallback. An optimization, not a correctness
    /// requirement.
    remote_available: AtomicBool,
}

impl RiskEngine {
    pub fn new(predictor: Arc<dyn RiskPredictor>, config: RiskEngineConfig) -> Self {
        Self {
            predictor,
            config,
            remote_available: AtomicBool::new(true),
        }
    }

    /// Whether the remote predictor is currently believed reachable.
    pub fn remote_available(&self) -> bool {
        self.remote_available.load(Ordering::Relaxed)
    }

    /// Probe the prediction service's health endpoint and update the
    /// availability flag. Returns the new availability.
    pub async fn check_health(&self) -> bool {
        let available = match self.predictor.health().await {
            Ok(health) => health.is_available(),
            Err(e) => {
                tracing::warn!(predictor = self.predictor.name(), "health probe failed: {e}");
                false
            }
        };
        self.remote_available.store(available, Ordering::Relaxed);
        available
    }

    /// Assess one student. Never fails: any remote problem degrades to the
    /// deterministic rule-based fallback.
    #[instrument(skip(self, metrics), fields(student = %metrics.student_id))]
    pub async fn assess(&self, metrics: &StudentMetrics) -> RiskAssessment {
        if metrics.overview.course_count == 0 {
            return unenrolled();
        }
        if self.remote_available.load(Ordering::Relaxed) {
            let request = predict_request(metrics);
            match self.predictor.predict(&request).await {
                Ok(prediction) => return self.from_remote(metrics, prediction),
                Err(e) => {
                    tracing::warn!(
                        predictor = self.predictor.name(),
                        "remote prediction failed, using rule-based fallback: {e}"
                    );
                    self.remote_available.store(false, Ordering::Relaxed);
                }
            }
        }
        self.fallback(metrics)
    }

    /// Map a well-formed remote prediction onto the normalized shape.
    ///
    /// The service's explicit `risk_level` and `is_at_risk` win when present;
    /// otherwise both derive from the canonical score bucket. A divergence
    /// between the explicit verdict and the bucket rule is logged for review.
    fn from_remote(
        &self,
        metrics: &StudentMetrics,
        prediction: crate::traits::Prediction,
    ) -> RiskAssessment {
        let score = prediction.risk_score.min(100);
        let bucket_level = RiskLevel::from_score(score);
        let level = prediction
            .risk_level
            .as_deref()
            .and_then(|s| s.parse::<RiskLevel>().ok())
            .unwrap_or(bucket_level);

        let bucket_at_risk = score >= 40;
        let is_at_risk = prediction.is_at_risk.unwrap_or(bucket_at_risk);
        if is_at_risk != bucket_at_risk {
            tracing::warn!(
                student = %metrics.student_id,
                score,
                service_verdict = is_at_risk,
                "prediction service at-risk verdict diverges from score bucket"
            );
        }

        let factors = if prediction.suggestions.is_empty() {
            rule_factors(metrics, self.config.no_access_policy)
        } else {
            prediction.suggestions
        };

        RiskAssessment {
            score,
            level,
            is_at_risk,
            factors,
            confidence: confidence_from_probability(prediction.probability),
            fallback: false,
        }
    }

    /// Deterministic rule-based assessment. Identical metrics always produce
    /// identical score, level, and factors.
    pub fn fallback(&self, metrics: &StudentMetrics) -> RiskAssessment {
        if metrics.overview.course_count == 0 {
            return unenrolled();
        }
        let points = rule_points(metrics, self.config.no_access_policy);
        let score = points.min(100) as u8;
        RiskAssessment {
            score,
            level: RiskLevel::from_score(score),
            is_at_risk: score >= 40,
            factors: rule_factors(metrics, self.config.no_access_policy),
            confidence: Confidence::Medium,
            fallback: true,
        }
    }
}

/// Assessment for a student with no enrollments. The inactivity penalties
/// only make sense for enrolled students; with no courses there is nothing
/// to score, and nothing for the remote model to predict on either.
fn unenrolled() -> RiskAssessment {
    RiskAssessment {
        score: 0,
        level: RiskLevel::Low,
        is_at_risk: false,
        factors: vec!["No enrollments".to_string()],
        confidence: Confidence::Low,
        fallback: true,
    }
}

/// Build the prediction service request body from aggregated metrics.
pub fn predict_request(metrics: &StudentMetrics) -> PredictRequest {
    PredictRequest {
        student_id: metrics.student_id.clone(),
        grade_level: metrics.grade_level,
        average_score: metrics.overview.average_score,
        completion_rate: metrics.overview.completion_rate,
        courses: metrics
            .courses
            .iter()
            .map(|course| PredictCourse {
                id: course.summary.course_id.clone(),
                name: course.summary.course_name.clone(),
                assignments: course
                    .assignments
                    .iter()
                    .filter_map(|a| a.progress.as_ref())
                    .map(|p| PredictAssignment {
                        progress: PredictProgress {
                            total_score: p.total_score.unwrap_or(0.0),
                            total_time: p.total_time.unwrap_or(0.0).max(0.0),
                            is_late: p.is_late.unwrap_or(false),
                        },
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// The rule point table. Kept separate from factor generation so both stay
/// trivially in sync with the documented thresholds.
fn rule_points(metrics: &StudentMetrics, policy: NoAccessPolicy) -> u32 {
    let overview = &metrics.overview;
    let mut points = 0u32;

    points += match overview.average_score {
        s if s < 50.0 => 40,
        s if s < 60.0 => 30,
        s if s < 70.0 => 15,
        _ => 0,
    };

    points += match overview.completion_rate {
        c if c < 30.0 => 35,
        c if c < 50.0 => 25,
        c if c < 70.0 => 10,
        _ => 0,
    };

    points += access_points(overview.last_access, policy);
    points
}

fn access_points(access: LastAccess, policy: NoAccessPolicy) -> u32 {
    match access {
        LastAccess::DaysAgo(d) if d > 21 => 25,
        LastAccess::DaysAgo(d) if d > 14 => 20,
        LastAccess::DaysAgo(d) if d > 7 => 10,
        LastAccess::DaysAgo(_) => 0,
        LastAccess::Unparseable => 15,
        LastAccess::Never => match policy {
            NoAccessPolicy::AssumeUnparseable => 15,
            NoAccessPolicy::AssumeDays(d) => access_points(LastAccess::DaysAgo(d), policy),
        },
    }
}

/// Human-readable factor strings naming each triggered condition, in a fixed
/// order: score, completion, recency, missing work.
fn rule_factors(metrics: &StudentMetrics, policy: NoAccessPolicy) -> Vec<String> {
    let overview = &metrics.overview;
    let mut factors = Vec::new();

    if overview.average_score < 70.0 {
        factors.push(format!(
            "Low overall score ({:.0}%)",
            overview.average_score
        ));
    }
    if overview.completion_rate < 70.0 {
        factors.push(format!(
            "Low completion rate ({:.0}%)",
            overview.completion_rate
        ));
    }

    match overview.last_access {
        LastAccess::DaysAgo(d) if d > 7 => {
            factors.push(format!("{d} days since last access"));
        }
        LastAccess::DaysAgo(_) => {}
        LastAccess::Unparseable => {
            factors.push("Unparseable last-access timestamp".to_string());
        }
        LastAccess::Never => match policy {
            NoAccessPolicy::AssumeUnparseable => {
                factors.push("No recorded activity".to_string());
            }
            NoAccessPolicy::AssumeDays(d) if d > 7 => {
                factors.push(format!("No recorded activity (assumed {d} days inactive)"));
            }
            NoAccessPolicy::AssumeDays(_) => {}
        },
    }

    if overview.missing_assignments > 0 {
        factors.push(format!(
            "{} missing assignments",
            overview.missing_assignments
        ));
    }

    factors
}

fn confidence_from_probability(probability: Option<f64>) -> Confidence {
    match probability {
        // Distance from the 0.5 decision boundary, scaled to [0, 1].
        Some(p) => {
            let certainty = (p - 0.5).abs() * 2.0;
            if certainty >= 0.6 {
                Confidence::High
            } else if certainty >= 0.3 {
                Confidence::Medium
            } else {
                Confidence::Low
            }
        }
        None => Confidence::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PredictError;
    use crate::model::StudentOverview;
    use crate::traits::{Prediction, ServiceHealth};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Scripted predictor for engine tests.
    struct StubPredictor {
        prediction: Option<Prediction>,
        healthy: bool,
        calls: AtomicU32,
    }

    impl StubPredictor {
        fn up(prediction: Prediction) -> Self {
            Self {
                prediction: Some(prediction),
                healthy: true,
                calls: AtomicU32::new(0),
            }
        }

        fn down() -> Self {
            Self {
                prediction: None,
                healthy: false,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl RiskPredictor for StubPredictor {
        fn name(&self) -> &str {
            "stub"
        }

        async fn predict(&self, _request: &PredictRequest) -> Result<Prediction, PredictError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.prediction
                .clone()
                .ok_or_else(|| PredictError::Network("connection refused".into()))
        }

        async fn health(&self) -> Result<ServiceHealth, PredictError> {
            if self.healthy {
                Ok(ServiceHealth {
                    status: "healthy".into(),
                    model_loaded: true,
                })
            } else {
                Err(PredictError::Network("connection refused".into()))
            }
        }
    }

    fn metrics(avg: f64, completion: f64, access: LastAccess) -> StudentMetrics {
        StudentMetrics {
            student_id: "s1".into(),
            grade_level: 12,
            overview: StudentOverview {
                course_count: 1,
                average_score: avg,
                completion_rate: completion,
                submission_rate: 50.0,
                missing_assignments: 2,
                last_access: access,
            },
            courses: vec![],
        }
    }

    fn engine(predictor: Arc<dyn RiskPredictor>) -> RiskEngine {
        RiskEngine::new(predictor, RiskEngineConfig::default())
    }

    #[tokio::test]
    async fn fallback_fires_when_remote_is_down() {
        let predictor = Arc::new(StubPredictor::down());
        let engine = engine(predictor.clone());
        let m = metrics(45.0, 25.0, LastAccess::DaysAgo(30));

        let assessment = engine.assess(&m).await;
        assert!(assessment.fallback);
        // 40 (score < 50) + 35 (completion < 30) + 25 (> 21 days), clamped.
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.level, RiskLevel::High);
        assert!(assessment.is_at_risk);
        assert!(assessment
            .factors
            .iter()
            .any(|f| f.contains("30 days since last access")));
    }

    #[tokio::test]
    async fn fallback_mid_tier_scoring() {
        let predictor = Arc::new(StubPredictor::down());
        let engine = engine(predictor);
        let m = metrics(55.0, 25.0, LastAccess::DaysAgo(30));

        let assessment = engine.assess(&m).await;
        // 30 (50 <= score < 60) + 35 (completion < 30) + 25 (> 21 days) = 90.
        assert_eq!(assessment.score, 90);
        assert_eq!(assessment.level, RiskLevel::High);
        assert!(assessment.is_at_risk);
        assert!(assessment.fallback);
    }

    #[tokio::test]
    async fn fallback_is_deterministic() {
        let predictor = Arc::new(StubPredictor::down());
        let engine = engine(predictor);
        let m = metrics(62.0, 55.0, LastAccess::DaysAgo(10));

        let a = engine.assess(&m).await;
        let b = engine.assess(&m).await;
        assert_eq!(a.score, b.score);
        assert_eq!(a.level, b.level);
        assert_eq!(a.factors, b.factors);
        // 15 (60 <= score < 70) + 10 (50 <= completion < 70) + 10 (8-14 days).
        assert_eq!(a.score, 35);
        assert_eq!(a.level, RiskLevel::Low);
        assert!(!a.is_at_risk);
    }

    #[tokio::test]
    async fn healthy_metrics_score_zero() {
        let predictor = Arc::new(StubPredictor::down());
        let engine = engine(predictor);
        let mut m = metrics(85.0, 90.0, LastAccess::DaysAgo(1));
        m.overview.missing_assignments = 0;

        let assessment = engine.assess(&m).await;
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.level, RiskLevel::Low);
        assert!(!assessment.is_at_risk);
        assert!(assessment.factors.is_empty());
    }

    #[tokio::test]
    async fn unenrolled_student_is_not_at_risk() {
        let predictor = Arc::new(StubPredictor::up(Prediction {
            risk_score: 95,
            risk_level: None,
            is_at_risk: None,
            probability: None,
            suggestions: vec![],
        }));
        let engine = engine(predictor.clone());

        let assessment = engine.assess(&StudentMetrics::default()).await;
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.level, RiskLevel::Low);
        assert!(!assessment.is_at_risk);
        assert_eq!(assessment.factors, vec!["No enrollments".to_string()]);
        // Nothing to predict on, so the remote service is never consulted.
        assert_eq!(predictor.calls(), 0);

        // The rule path agrees with the full assessment path.
        let direct = engine.fallback(&StudentMetrics::default());
        assert!(!direct.is_at_risk);
        assert_eq!(direct.score, 0);
    }

    #[tokio::test]
    async fn never_accessed_policy_is_explicit() {
        let predictor: Arc<dyn RiskPredictor> = Arc::new(StubPredictor::down());
        let unparseable = RiskEngine::new(
            predictor.clone(),
            RiskEngineConfig {
                no_access_policy: NoAccessPolicy::AssumeUnparseable,
            },
        );
        let as_month = RiskEngine::new(
            predictor,
            RiskEngineConfig {
                no_access_policy: NoAccessPolicy::AssumeDays(30),
            },
        );

        let m = metrics(85.0, 90.0, LastAccess::Never);
        assert_eq!(unparseable.assess(&m).await.score, 15);
        assert_eq!(as_month.assess(&m).await.score, 25);
    }

    #[tokio::test]
    async fn remote_success_maps_to_normalized_shape() {
        let predictor = Arc::new(StubPredictor::up(Prediction {
            risk_score: 72,
            risk_level: None,
            is_at_risk: None,
            probability: Some(0.9),
            suggestions: vec!["Schedule a check-in".into()],
        }));
        let engine = engine(predictor);

        let assessment = engine.assess(&metrics(80.0, 80.0, LastAccess::DaysAgo(1))).await;
        assert!(!assessment.fallback);
        assert_eq!(assessment.score, 72);
        assert_eq!(assessment.level, RiskLevel::High);
        assert!(assessment.is_at_risk);
        assert_eq!(assessment.confidence, Confidence::High);
        assert_eq!(assessment.factors, vec!["Schedule a check-in".to_string()]);
    }

    #[tokio::test]
    async fn service_level_and_verdict_override_bucket() {
        let predictor = Arc::new(StubPredictor::up(Prediction {
            risk_score: 45,
            risk_level: Some("High Risk".into()),
            is_at_risk: Some(false),
            probability: Some(0.52),
            suggestions: vec![],
        }));
        let engine = engine(predictor);

        let assessment = engine.assess(&metrics(80.0, 80.0, LastAccess::DaysAgo(1))).await;
        assert_eq!(assessment.level, RiskLevel::High); // service's level wins
        assert!(!assessment.is_at_risk); // explicit verdict wins over bucket
        assert_eq!(assessment.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn unavailability_flag_skips_later_remote_attempts() {
        let predictor = Arc::new(StubPredictor::down());
        let engine = engine(predictor.clone());
        let m = metrics(45.0, 25.0, LastAccess::DaysAgo(30));

        let first = engine.assess(&m).await;
        let second = engine.assess(&m).await;
        assert!(first.fallback && second.fallback);
        // Only the first assessment tried the remote service.
        assert_eq!(predictor.calls(), 1);
        assert!(!engine.remote_available());
    }

    #[tokio::test]
    async fn check_health_restores_availability() {
        let predictor = Arc::new(StubPredictor::up(Prediction {
            risk_score: 10,
            risk_level: None,
            is_at_risk: None,
            probability: None,
            suggestions: vec![],
        }));
        let engine = engine(predictor);
        engine.remote_available.store(false, Ordering::Relaxed);

        assert!(engine.check_health().await);
        assert!(engine.remote_available());
    }

    #[test]
    fn remote_score_is_clamped() {
        let predictor = Arc::new(StubPredictor::down());
        let engine = engine(predictor);
        let assessment = engine.from_remote(
            &metrics(80.0, 80.0, LastAccess::DaysAgo(1)),
            Prediction {
                risk_score: 250,
                risk_level: None,
                is_at_risk: None,
                probability: None,
                suggestions: vec![],
            },
        );
        assert!(assessment.score <= 100);
    }
}
