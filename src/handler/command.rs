//! Subprocess-backed handler.
//!
//! Each handler definition is a TOML file mapping a category to an
//! executable. The payload is piped to the command's stdin; stdout becomes
//! the record's response info, a non-zero exit becomes a handler failure
//! with the captured stderr.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{Execution, Handler, HandlerRegistry};
use crate::error::{Error, Result};
use crate::model::{RecordId, WorkRecord};

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct HandlerFile {
    handler: HandlerDef,
}

/// One handler definition.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerDef {
    /// Category this handler serves.
    pub category: String,
    /// Executable to run, payload on stdin.
    pub command: PathBuf,
    /// When set, the payload is parsed as JSON and this field becomes the
    /// duplicate-suppression key.
    #[serde(default)]
    pub key_field: Option<String>,
    /// Run detached: the worker slot is released while the command runs.
    #[serde(default)]
    pub detach: bool,
}

/// Handler that delegates execution to an external command.
pub struct CommandHandler {
    def: HandlerDef,
    command: PathBuf,
}

impl CommandHandler {
    pub fn new(def: HandlerDef) -> Result<Self> {
        // Resolve relative command paths against the process CWD now;
        // resolving at execution time would race with any chdir.
        let command = if def.command.is_relative() {
            std::env::current_dir()?.join(&def.command)
        } else {
            def.command.clone()
        };
        Ok(Self { def, command })
    }
}

#[async_trait]
impl Handler for CommandHandler {
    fn dedup_key(&self, record: &WorkRecord) -> Result<Option<String>> {
        let Some(ref field) = self.def.key_field else {
            return Ok(None);
        };
        let payload: serde_json::Value = serde_json::from_str(&record.payload).map_err(|e| {
            Error::Handler(format!("payload is not JSON, cannot derive dedup key: {e}"))
        })?;
        Ok(match payload.get(field) {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        })
    }

    async fn execute(&self, record: &WorkRecord) -> Result<Execution> {
        let command = self.command.clone();
        let category = record.category.clone();
        let id = record.id.clone();
        let payload = record.payload.clone();

        if self.def.detach {
            Ok(Execution::Detached(
                run_command(command, category, id, payload).boxed(),
            ))
        } else {
            run_command(command, category, id, payload)
                .await
                .map(Execution::Completed)
        }
    }
}

async fn run_command(
    command: PathBuf,
    category: String,
    id: RecordId,
    payload: String,
) -> Result<Option<String>> {
    debug!(command = %command.display(), record_id = %id, "running handler command");

    let mut child = Command::new(&command)
        .env("IMPORTQ_CATEGORY", &category)
        .env("IMPORTQ_RECORD_ID", id.as_str())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(payload.as_bytes()).await?;
        // Dropping stdin closes the pipe so the command sees EOF.
    }

    let output = child.wait_with_output().await?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!stdout.is_empty()).then_some(stdout))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(Error::Handler(format!(
            "{} exited with status {}: {stderr}",
            command.display(),
            output.status.code().unwrap_or(-1),
        )))
    }
}

/// Load all `.toml` handler definitions from a directory into a registry.
/// Returns the number of handlers registered.
pub fn load_dir(dir: &Path, registry: &mut HandlerRegistry) -> Result<usize> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::Config(format!("cannot read handler dir {}: {e}", dir.display())))?;

    let mut count = 0;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            let content = std::fs::read_to_string(&path)?;
            let file: HandlerFile = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("bad handler config {}: {e}", path.display())))?;
            let def = file.handler;
            let category = def.category.clone();
            registry.register(category, Arc::new(CommandHandler::new(def)?))?;
            count += 1;
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewWorkRecord;

    fn handler(key_field: Option<&str>) -> CommandHandler {
        CommandHandler::new(HandlerDef {
            category: "product".to_string(),
            command: PathBuf::from("/bin/cat"),
            key_field: key_field.map(str::to_string),
            detach: false,
        })
        .unwrap()
    }

    #[test]
    fn dedup_key_extracts_string_field() {
        let record = NewWorkRecord::new("product", r#"{"sku":"A-1","qty":3}"#).into_record();
        let key = handler(Some("sku")).dedup_key(&record).unwrap();
        assert_eq!(key.as_deref(), Some("A-1"));
    }

    #[test]
    fn dedup_key_absent_field_is_none() {
        let record = NewWorkRecord::new("product", r#"{"qty":3}"#).into_record();
        assert!(handler(Some("sku")).dedup_key(&record).unwrap().is_none());
    }

    #[test]
    fn dedup_key_rejects_non_json_payload() {
        let record = NewWorkRecord::new("product", "not json").into_record();
        let err = handler(Some("sku")).dedup_key(&record).unwrap_err();
        assert!(matches!(err, Error::Handler(_)));
    }

    #[test]
    fn no_key_field_means_no_key_even_for_bad_payloads() {
        let record = NewWorkRecord::new("product", "not json").into_record();
        assert!(handler(None).dedup_key(&record).unwrap().is_none());
    }
}
