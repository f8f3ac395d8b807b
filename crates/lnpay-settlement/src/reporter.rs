use std::sync::Mutex;

use crate::traits::ErrorReporter;
use crate::types::FailureReport;

/// Emits execution failures as structured `tracing` error events.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn capture_execution_failure(&self, report: &FailureReport) {
        tracing::error!(
            payment_id = %report.payment_id,
            user_id = %report.user_id,
            destination = %report.destination,
            payment_request = %report.payment_request,
            error = %report.message,
            "outgoing payment execution failed"
        );
    }
}

/// Keeps every report in memory; handy for inspection in tests and tooling.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<FailureReport>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

impl ErrorReporter for RecordingReporter {
    fn capture_execution_failure(&self, report: &FailureReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
    }
}
