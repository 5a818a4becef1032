//! Versioned export of the whole store, for backups and for moving a
//! single-terminal deployment between machines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, event::VisitEvent, subject::Subject};

/// Format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
  pub version:     u32,
  pub exported_at: DateTime<Utc>,
  #[serde(default)]
  pub subjects:    Vec<Subject>,
  #[serde(default)]
  pub events:      Vec<VisitEvent>,
}

impl Snapshot {
  pub fn new(subjects: Vec<Subject>, events: Vec<VisitEvent>) -> Self {
    Self {
      version: SNAPSHOT_VERSION,
      exported_at: Utc::now(),
      subjects,
      events,
    }
  }

  /// Refuse snapshots written by a newer build; older versions are read
  /// as-is since every field added since has a default.
  pub fn check_version(&self) -> Result<()> {
    if self.version > SNAPSHOT_VERSION {
      return Err(Error::UnsupportedSnapshot {
        found:     self.version,
        supported: SNAPSHOT_VERSION,
      });
    }
    Ok(())
  }
}
