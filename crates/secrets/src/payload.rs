use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use batchline_common::{Credential, Error, Result};

/// Raw secret value as a store hands it back.
#[derive(Clone, PartialEq, Eq)]
pub enum SecretPayload {
    Text(String),
    /// Binary secrets may arrive base64 encoded or as the raw bytes.
    Binary(Vec<u8>),
}

impl std::fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretPayload::Text(_) => f.write_str("SecretPayload::Text(***)"),
            SecretPayload::Binary(bytes) => write!(f, "SecretPayload::Binary({} bytes)", bytes.len()),
        }
    }
}

impl SecretPayload {
    /// Unwrap the JSON document inside the payload into a [`Credential`].
    pub fn into_credential(self, secret_id: &str) -> Result<Credential> {
        let text = match self {
            SecretPayload::Text(text) => text,
            SecretPayload::Binary(bytes) => decode_binary(secret_id, bytes)?,
        };
        serde_json::from_str(&text)
            .map_err(|e| Error::secret(secret_id, format!("secret is not a credential document: {e}")))
    }
}

fn decode_binary(secret_id: &str, bytes: Vec<u8>) -> Result<String> {
    let trimmed = bytes.trim_ascii();
    let decoded = match STANDARD.decode(trimmed) {
        Ok(decoded) => decoded,
        Err(_) => bytes,
    };
    String::from_utf8(decoded).map_err(|_| Error::secret(secret_id, "binary secret is not UTF-8"))
}
