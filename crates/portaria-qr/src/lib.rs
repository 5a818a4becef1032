//! QR badge codec for Portaria.
//!
//! A badge carries a small JSON object, optionally wrapped in base64 by the
//! generator. Pure synchronous; no HTTP or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use portaria_qr::decode;
//!
//! let payload = decode(r#"{"nome":"Ana","setor":"TI"}"#).unwrap();
//! assert_eq!(payload.subject_key().as_str(), "Ana (TI)");
//! ```

pub mod error;
mod decode;
mod encode;

pub use error::{Error, Result};
use portaria_core::{
  event::VisitContext,
  subject::{EmployeeProfile, Profile, SubjectKey, SubjectKind, VehicleProfile},
};
use serde::{Deserialize, Serialize};

// ─── Public types ────────────────────────────────────────────────────────────

/// What is printed on a badge.
///
/// Field names follow the badges already in circulation; the English
/// spellings are accepted on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id:    Option<String>,
  #[serde(alias = "name")]
  pub nome:  String,
  /// Sector for employees, company for vehicles.
  #[serde(alias = "company")]
  pub setor: String,
  #[serde(default, alias = "plate", skip_serializing_if = "Option::is_none")]
  pub placa: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ramal: Option<String>,
}

impl QrPayload {
  pub fn employee(nome: impl Into<String>, setor: impl Into<String>) -> Self {
    Self { id: None, nome: nome.into(), setor: setor.into(), placa: None, ramal: None }
  }

  /// A badge with a plate identifies a vehicle.
  pub fn kind(&self) -> SubjectKind {
    if self.placa.is_some() {
      SubjectKind::Vehicle
    } else {
      SubjectKind::Employee
    }
  }

  /// The key the badge's history is recorded under.
  pub fn subject_key(&self) -> SubjectKey {
    match &self.placa {
      Some(plate) => SubjectKey::vehicle(plate),
      None => SubjectKey::employee(&self.nome, &self.setor),
    }
  }

  /// A profile matching the badge, for registering an unseen holder.
  pub fn profile(&self) -> Profile {
    match &self.placa {
      Some(plate) => Profile::Vehicle(VehicleProfile {
        plate:   plate.clone(),
        driver:  Some(self.nome.clone()),
        company: Some(self.setor.clone()),
      }),
      None => Profile::Employee(EmployeeProfile {
        name:      self.nome.clone(),
        sector:    self.setor.clone(),
        extension: self.ramal.clone(),
      }),
    }
  }

  /// Fields copied onto the event recorded for this scan.
  pub fn context(&self) -> VisitContext {
    VisitContext {
      plate: self.placa.clone(),
      extension: self.ramal.clone(),
      ..Default::default()
    }
  }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Decode scanned text, either the JSON itself or base64 of it.
///
/// Blank optional fields are dropped; a blank `nome` or `setor` is
/// [`Error::MissingField`].
pub fn decode(input: &str) -> Result<QrPayload> { decode::decode(input) }

/// JSON text to print on a badge.
pub fn encode(payload: &QrPayload) -> Result<String> { encode::encode(payload) }

/// Base64 of [`encode`], for generators that cannot embed raw JSON.
pub fn encode_base64(payload: &QrPayload) -> Result<String> {
  encode::encode_base64(payload)
}
