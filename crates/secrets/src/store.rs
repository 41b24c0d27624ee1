use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use batchline_common::{Credential, Error, Result};
use tracing::{debug, info};

use crate::payload::SecretPayload;

/// Source of named secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the raw payload stored under `secret_id`.
    async fn fetch(&self, secret_id: &str) -> Result<SecretPayload>;

    /// Fetch `secret_id` and unwrap it into a warehouse credential.
    async fn resolve(&self, secret_id: &str) -> Result<Credential> {
        let credential = self.fetch(secret_id).await?.into_credential(secret_id)?;
        info!(secret_id, engine = %credential.engine, host = %credential.host, "resolved warehouse credential");
        Ok(credential)
    }
}

/// Secret ids may contain `/` and other characters that are not valid in
/// an environment variable or file name.
fn normalise_id(secret_id: &str) -> String {
    secret_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

/// Secrets injected as environment variables holding the JSON document.
///
/// `prod/warehouse` is looked up as `<prefix>PROD_WAREHOUSE`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn variable_name(&self, secret_id: &str) -> String {
        format!("{}{}", self.prefix, normalise_id(secret_id).replace(['-', '.'], "_").to_ascii_uppercase())
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn fetch(&self, secret_id: &str) -> Result<SecretPayload> {
        let name = self.variable_name(secret_id);
        debug!(secret_id, variable = %name, "reading secret from environment");
        std::env::var(&name)
            .map(SecretPayload::Text)
            .map_err(|_| Error::secret(secret_id, format!("environment variable {name} is not set")))
    }
}

/// Secrets mounted as files: `<dir>/<id>.json` holds the JSON document,
/// `<dir>/<id>.bin` a binary (optionally base64) payload.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn fetch(&self, secret_id: &str) -> Result<SecretPayload> {
        let stem = normalise_id(secret_id);
        let text_path = self.dir.join(format!("{stem}.json"));
        match tokio::fs::read_to_string(&text_path).await {
            Ok(text) => return Ok(SecretPayload::Text(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::secret(secret_id, format!("{}: {e}", text_path.display()))),
        }

        let binary_path = self.dir.join(format!("{stem}.bin"));
        tokio::fs::read(&binary_path).await.map(SecretPayload::Binary).map_err(|e| {
            Error::secret(secret_id, format!("no secret file in {}: {e}", self.dir.display()))
        })
    }
}

/// In-memory secrets, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, SecretPayload>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, secret_id: impl Into<String>, payload: SecretPayload) -> Self {
        self.secrets.insert(secret_id.into(), payload);
        self
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn fetch(&self, secret_id: &str) -> Result<SecretPayload> {
        self.secrets
            .get(secret_id)
            .cloned()
            .ok_or_else(|| Error::secret(secret_id, "secret not found"))
    }
}
