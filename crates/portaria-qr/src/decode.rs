//! Scan text → [`QrPayload`].
//!
//! Pipeline:
//!   raw &str
//!     └─ unwrap_base64()   → JSON text
//!          └─ serde_json   → RawPayload (every field optional)
//!               └─ validate() → QrPayload

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::Deserialize;

use crate::{
  QrPayload,
  error::{Error, Result},
};

/// Lenient mirror of [`QrPayload`]; lets a missing name surface as
/// [`Error::MissingField`] instead of a serde message.
#[derive(Deserialize)]
struct RawPayload {
  #[serde(default, deserialize_with = "text_or_number")]
  id:    Option<String>,
  #[serde(default, alias = "name")]
  nome:  Option<String>,
  #[serde(default, alias = "company")]
  setor: Option<String>,
  #[serde(default, alias = "plate")]
  placa: Option<String>,
  #[serde(default, deserialize_with = "text_or_number")]
  ramal: Option<String>,
}

/// Older generators wrote ids and extensions as JSON numbers.
fn text_or_number<'de, D>(de: D) -> std::result::Result<Option<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Field {
    Text(String),
    Number(i64),
  }
  Ok(Option::<Field>::deserialize(de)?.map(|field| match field {
    Field::Text(s) => s,
    Field::Number(n) => n.to_string(),
  }))
}

pub(crate) fn decode(input: &str) -> Result<QrPayload> {
  let json = unwrap_base64(input.trim())?;
  let raw: RawPayload = serde_json::from_str(&json)
    .map_err(|e| Error::InvalidPayload(e.to_string()))?;
  validate(raw)
}

fn unwrap_base64(text: &str) -> Result<String> {
  if text.starts_with('{') {
    return Ok(text.to_owned());
  }
  let bytes = B64
    .decode(text)
    .map_err(|_| Error::InvalidPayload("neither JSON nor base64".to_owned()))?;
  let decoded = String::from_utf8(bytes)
    .map_err(|_| Error::InvalidPayload("base64 content is not UTF-8".to_owned()))?;
  Ok(decoded.trim().to_owned())
}

fn non_blank(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

fn validate(raw: RawPayload) -> Result<QrPayload> {
  let nome = non_blank(raw.nome).ok_or(Error::MissingField("nome"))?;
  let setor = non_blank(raw.setor).ok_or(Error::MissingField("setor"))?;
  Ok(QrPayload {
    id: non_blank(raw.id),
    nome,
    setor,
    placa: non_blank(raw.placa),
    ramal: non_blank(raw.ramal),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_json() {
    let p = decode(r#"{"nome":"Ana","setor":"TI"}"#).unwrap();
    assert_eq!(p.nome, "Ana");
    assert_eq!(p.setor, "TI");
    assert_eq!(p.placa, None);
  }

  #[test]
  fn english_aliases_and_numeric_id() {
    let p = decode(r#"{"id":7,"name":"Carlos","company":"ACME","plate":"abc1234"}"#)
      .unwrap();
    assert_eq!(p.id.as_deref(), Some("7"));
    assert_eq!(p.setor, "ACME");
    assert_eq!(p.placa.as_deref(), Some("abc1234"));
  }

  #[test]
  fn numeric_extension() {
    let p = decode(r#"{"nome":"Ana","setor":"TI","ramal":2010}"#).unwrap();
    assert_eq!(p.ramal.as_deref(), Some("2010"));
    assert_eq!(p.context().extension.as_deref(), Some("2010"));
  }

  #[test]
  fn base64_wrapped() {
    let text = B64.encode(r#"{"nome":"Ana","setor":"TI","ramal":" 2010 "}"#);
    let p = decode(&text).unwrap();
    assert_eq!(p.ramal.as_deref(), Some("2010"));
  }

  #[test]
  fn not_json_is_rejected() {
    assert!(matches!(decode("not json"), Err(Error::InvalidPayload(_))));
    assert!(matches!(decode("{nome: Ana}"), Err(Error::InvalidPayload(_))));
    assert!(matches!(decode("[1, 2]"), Err(Error::InvalidPayload(_))));
  }

  #[test]
  fn missing_or_blank_name_is_a_missing_field() {
    assert!(matches!(
      decode(r#"{"setor":"TI"}"#),
      Err(Error::MissingField("nome"))
    ));
    assert!(matches!(
      decode(r#"{"nome":"Ana","setor":"  "}"#),
      Err(Error::MissingField("setor"))
    ));
  }

  #[test]
  fn blank_plate_is_not_a_vehicle() {
    let p = decode(r#"{"nome":"Ana","setor":"TI","placa":""}"#).unwrap();
    assert_eq!(p.placa, None);
  }
}
