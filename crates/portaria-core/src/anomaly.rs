//! Boundary to the external anomaly classifier.
//!
//! The classification itself happens elsewhere; this module only fixes the
//! shape of the exchange.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::event::VisitEvent;

/// Verdict returned by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
  pub anomaly_detected:    bool,
  #[serde(default)]
  pub anomaly_description: String,
}

/// Something that can judge an ordered list of scans.
pub trait AnomalyDetector: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// `events` are ordered oldest first.
  fn detect<'a>(
    &'a self,
    events: &'a [VisitEvent],
  ) -> impl Future<Output = Result<AnomalyReport, Self::Error>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn report_uses_camel_case_on_the_wire() {
    let report: AnomalyReport = serde_json::from_str(
      r#"{"anomalyDetected":true,"anomalyDescription":"two entries in a row"}"#,
    )
    .unwrap();
    assert!(report.anomaly_detected);
    assert_eq!(report.anomaly_description, "two entries in a row");
  }
}
