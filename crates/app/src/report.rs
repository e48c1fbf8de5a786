use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::harness::ProbeResult;
use crate::scenario::{CleanupRecord, ScenarioFailure};

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub stage: &'static str,
    pub message: String,
}

impl From<&ScenarioFailure> for FailureSummary {
    fn from(failure: &ScenarioFailure) -> Self {
        Self {
            stage: failure.stage(),
            message: failure.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,
    pub cleanup: Vec<CleanupRecord>,
    pub duration_ms: u128,
}

impl ScenarioReport {
    pub fn cleanup_warnings(&self) -> impl Iterator<Item = &CleanupRecord> {
        self.cleanup.iter().filter(|record| !record.succeeded())
    }
}

/// Outcome of one harness run. Printed, never written anywhere.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub readiness: Vec<ProbeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub scenarios: Vec<ScenarioReport>,
}

impl RunReport {
    /// Cleanup results never count; only the gate and the scenario outcomes do.
    pub fn passed(&self) -> bool {
        self.aborted.is_none() && self.scenarios.iter().all(|s| s.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| !s.passed).count()
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.scenario == name)
    }

    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        for probe in &self.readiness {
            let state = if probe.ready { "ready" } else { "NOT READY" };
            let _ = writeln!(
                out,
                "probe {:<16} {state} after {} attempt(s) ({})",
                probe.service.name(),
                probe.attempts,
                probe.url
            );
        }
        if let Some(reason) = &self.aborted {
            let _ = writeln!(out, "run aborted: {reason}");
            return out;
        }
        for report in &self.scenarios {
            let verdict = if report.passed { "PASS" } else { "FAIL" };
            let _ = writeln!(
                out,
                "{verdict} {} ({} ms)",
                report.scenario, report.duration_ms
            );
            if let Some(failure) = &report.failure {
                let _ = writeln!(out, "     {}", failure.message);
            }
            for warning in report.cleanup_warnings() {
                let _ = writeln!(
                    out,
                    "     warning: cleanup of product {} failed: {}",
                    warning.product_id,
                    warning.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        let _ = writeln!(
            out,
            "{} scenario(s), {} failed",
            self.scenarios.len(),
            self.failed_count()
        );
        out
    }
}
