//! Anomaly detection backed by an external HTTP classifier.
//!
//! The scans are POSTed as JSON to the configured endpoint; the answer must
//! be an [`AnomalyReport`]. Without an endpoint every request fails with
//! [`Error::AnomalyDisabled`], which the API reports as `503`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use portaria_core::{
  anomaly::{AnomalyDetector, AnomalyReport},
  event::{Direction, VisitEvent},
};
use reqwest::Client;
use serde::Serialize;

use crate::{AnomalyConfig, error::Error};

/// One scan as sent to the classifier.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanRecord<'a> {
  subject_key:  &'a str,
  display_name: &'a str,
  timestamp:    DateTime<Utc>,
  scan_type:    Direction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectRequest<'a> {
  scan_history: Vec<ScanRecord<'a>>,
}

impl<'a> DetectRequest<'a> {
  fn new(events: &'a [VisitEvent]) -> Self {
    Self {
      scan_history: events
        .iter()
        .map(|e| ScanRecord {
          subject_key:  e.subject_key.as_str(),
          display_name: &e.display_name,
          timestamp:    e.recorded_at,
          scan_type:    e.direction,
        })
        .collect(),
    }
  }
}

/// Detector chosen from configuration at startup.
pub enum ConfiguredDetector {
  Http(HttpAnomalyDetector),
  Disabled,
}

impl ConfiguredDetector {
  pub fn from_config(config: &AnomalyConfig) -> Result<Self, Error> {
    match &config.endpoint {
      Some(endpoint) => Ok(Self::Http(HttpAnomalyDetector::new(
        endpoint.clone(),
        config.api_key.clone(),
        Duration::from_secs(config.timeout_secs),
      )?)),
      None => Ok(Self::Disabled),
    }
  }
}

impl AnomalyDetector for ConfiguredDetector {
  type Error = Error;

  async fn detect<'a>(&'a self, events: &'a [VisitEvent]) -> Result<AnomalyReport, Error> {
    match self {
      Self::Http(http) => http.detect(events).await,
      Self::Disabled => Err(Error::AnomalyDisabled),
    }
  }
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpAnomalyDetector {
  client:   Client,
  endpoint: String,
  api_key:  Option<String>,
}

impl HttpAnomalyDetector {
  pub fn new(
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
  ) -> Result<Self, Error> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, endpoint, api_key })
  }
}

impl AnomalyDetector for HttpAnomalyDetector {
  type Error = Error;

  async fn detect<'a>(&'a self, events: &'a [VisitEvent]) -> Result<AnomalyReport, Error> {
    let body = DetectRequest::new(events);

    let mut req = self.client.post(&self.endpoint).json(&body);
    if let Some(key) = &self.api_key {
      req = req.bearer_auth(key);
    }
    let resp = req.send().await?;
    if !resp.status().is_success() {
      return Err(Error::AnomalyStatus(resp.status()));
    }
    let report: AnomalyReport = resp.json().await?;
    tracing::debug!(scans = events.len(), detected = report.anomaly_detected, "classifier answered");
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use portaria_core::{
    event::{NewEvent, VisitContext},
    subject::{SubjectKey, SubjectKind},
  };

  use super::*;

  fn scan(direction: Direction) -> VisitEvent {
    VisitEvent::from_new(NewEvent {
      subject_key:  SubjectKey::employee("Ana", "TI"),
      kind:         SubjectKind::Employee,
      direction,
      recorded_at:  Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap(),
      visit_id:     None,
      display_name: "Ana".into(),
      context:      VisitContext::default(),
    })
  }

  #[tokio::test]
  async fn disabled_detector_refuses() {
    let detector = ConfiguredDetector::from_config(&AnomalyConfig::default()).unwrap();
    let err = detector.detect(&[scan(Direction::Entry)]).await.unwrap_err();
    assert!(matches!(err, Error::AnomalyDisabled));
  }

  #[test]
  fn request_lists_scans_in_camel_case() {
    let events = [scan(Direction::Entry), scan(Direction::Exit)];
    let body = DetectRequest::new(&events);
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["scanHistory"][0]["subjectKey"], "Ana (TI)");
    assert_eq!(json["scanHistory"][1]["scanType"], "exit");
    assert_eq!(json["scanHistory"][0]["timestamp"], "2024-05-02T08:00:00Z");
  }
}
