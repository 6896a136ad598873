//! Session report envelope.
//!
//! Wraps a [`SessionSummary`] with producer metadata so the presentation
//! side can store or render it without knowing which agent produced it.

use crate::core::session::SessionSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Report format version.
pub const REPORT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "biostream-agent";

/// Producer metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    /// Unique instance identifier (UUID)
    pub instance_id: String,
}

/// A finished session, ready for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub session_id: String,
    /// When the session started (RFC3339)
    pub started_at_utc: String,
    /// When the session stopped (RFC3339)
    pub ended_at_utc: String,
    /// When this report was built (RFC3339)
    pub computed_at_utc: String,
    pub summary: SessionSummary,
}

/// Builds reports stamped with one agent instance id.
pub struct ReportBuilder {
    instance_id: Uuid,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn build(&self, summary: &SessionSummary) -> SessionReport {
        self.build_at(summary, Utc::now())
    }

    /// Build a report with an explicit computation time.
    pub fn build_at(&self, summary: &SessionSummary, computed_at: DateTime<Utc>) -> SessionReport {
        SessionReport {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: crate::VERSION.to_string(),
                instance_id: self.instance_id.to_string(),
            },
            session_id: Uuid::new_v4().to_string(),
            started_at_utc: summary.started_at.to_rfc3339(),
            ended_at_utc: summary.ended_at.to_rfc3339(),
            computed_at_utc: computed_at.to_rfc3339(),
            summary: summary.clone(),
        }
    }

    pub fn to_json(&self, report: &SessionReport) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(report)
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::{summarize, SessionGoal, SessionSample};
    use chrono::Duration;

    fn summary() -> SessionSummary {
        let start = Utc::now();
        let record: Vec<SessionSample> = (0..5)
            .map(|i| SessionSample {
                timestamp: start + Duration::seconds(i),
                alpha: 2.0,
                beta: 1.0,
                theta: 0.5,
                delta: 0.5,
                symmetry: 0.1,
            })
            .collect();
        summarize(&record, start, start + Duration::seconds(5), SessionGoal::Relaxation, 0.05)
            .unwrap()
    }

    #[test]
    fn test_report_envelope() {
        let builder = ReportBuilder::new();
        let report = builder.build(&summary());

        assert_eq!(report.report_version, REPORT_VERSION);
        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.producer.instance_id, builder.instance_id().to_string());
        assert!(Uuid::parse_str(&report.session_id).is_ok());
    }

    #[test]
    fn test_each_report_gets_a_session_id() {
        let builder = ReportBuilder::new();
        let s = summary();
        assert_ne!(builder.build(&s).session_id, builder.build(&s).session_id);
    }

    #[test]
    fn test_report_json() {
        let builder = ReportBuilder::new();
        let json = builder.to_json(&builder.build(&summary())).unwrap();

        assert!(json.contains("\"report_version\": \"1.0\""));
        assert!(json.contains("\"mental_state\": \"Relaxed\""));
        assert!(json.contains("\"Relaxed\":"));
        assert!(json.contains("\"goal\": \"relaxation\""));

        let parsed: SessionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.summary.sample_count, 5);
    }
}
