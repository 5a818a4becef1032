use base64::{Engine as _, engine::general_purpose::STANDARD as B64};

use crate::{QrPayload, error::Result};

pub(crate) fn encode(payload: &QrPayload) -> Result<String> {
  Ok(serde_json::to_string(payload)?)
}

pub(crate) fn encode_base64(payload: &QrPayload) -> Result<String> {
  Ok(B64.encode(encode(payload)?))
}
