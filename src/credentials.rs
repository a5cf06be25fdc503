//! API key resolution.
//!
//! Sources are consulted in order, and blank values are skipped:
//!
//! 1. an explicit value (`--api-key`, or set on the builder directly)
//! 2. the secrets file, TOML with a `MISTRAL_API_KEY` entry
//!    (default `<config dir>/docextract/secrets.toml`)
//! 3. the `MISTRAL_API_KEY` environment variable
//! 4. an interactive prompt, when the caller supplies one
//!
//! Nothing here ever writes a key to disk or to the log.

use crate::error::DocExtractError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable and secrets-file key holding the credential.
pub const API_KEY_VAR: &str = "MISTRAL_API_KEY";

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Explicit,
    SecretsFile,
    Environment,
    Prompt,
}

/// `<config dir>/docextract/secrets.toml`, if the platform has a config dir.
pub fn default_secrets_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("docextract").join("secrets.toml"))
}

/// Read the key from a TOML secrets file.
///
/// A missing file is `Ok(None)`; a file that exists but does not parse is an
/// error, so a typo does not silently fall through to another source.
pub fn read_secrets_file(path: &Path) -> Result<Option<String>, DocExtractError> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(DocExtractError::SecretsFile {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })
        }
    };
    let table: toml::Table = toml::from_str(&text).map_err(|e| DocExtractError::SecretsFile {
        path: path.to_path_buf(),
        detail: e.message().to_string(),
    })?;
    Ok(table
        .get(API_KEY_VAR)
        .and_then(toml::Value::as_str)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string))
}

/// Resolve the API key from every source in priority order.
///
/// `secrets_path` of `None` means [`default_secrets_path`].
pub fn resolve_api_key(
    explicit: Option<&str>,
    secrets_path: Option<&Path>,
    prompt: Option<&dyn Fn() -> Option<String>>,
) -> Result<(String, KeySource), DocExtractError> {
    let env_value = std::env::var(API_KEY_VAR).ok();
    let default_path = default_secrets_path();
    let secrets_path = secrets_path.or(default_path.as_deref());
    resolve_from(explicit, secrets_path, env_value, prompt)
}

fn resolve_from(
    explicit: Option<&str>,
    secrets_path: Option<&Path>,
    env_value: Option<String>,
    prompt: Option<&dyn Fn() -> Option<String>>,
) -> Result<(String, KeySource), DocExtractError> {
    fn usable(v: &str) -> Option<String> {
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    }

    if let Some(key) = explicit.and_then(usable) {
        return Ok((key, KeySource::Explicit));
    }
    if let Some(path) = secrets_path {
        if let Some(key) = read_secrets_file(path)? {
            debug!("API key read from {}", path.display());
            return Ok((key, KeySource::SecretsFile));
        }
    }
    if let Some(key) = env_value.as_deref().and_then(usable) {
        return Ok((key, KeySource::Environment));
    }
    if let Some(ask) = prompt {
        if let Some(key) = ask().as_deref().and_then(usable) {
            return Ok((key, KeySource::Prompt));
        }
    }

    let file_hint = secrets_path
        .map(|p| format!("\n  • add {API_KEY_VAR} = \"...\" to {}", p.display()))
        .unwrap_or_default();
    Err(DocExtractError::MissingApiKey {
        hint: format!(
            "Provide one of:\n  • --api-key <KEY>\n  • export {API_KEY_VAR}=<KEY>{file_hint}"
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn explicit_wins() {
        let (_d, path) = secrets("MISTRAL_API_KEY = \"from-file\"");
        let (key, src) =
            resolve_from(Some("from-flag"), Some(&path), Some("from-env".into()), None).unwrap();
        assert_eq!(key, "from-flag");
        assert_eq!(src, KeySource::Explicit);
    }

    #[test]
    fn secrets_file_beats_environment() {
        let (_d, path) = secrets("MISTRAL_API_KEY = \"from-file\"\nother = 1\n");
        let (key, src) = resolve_from(None, Some(&path), Some("from-env".into()), None).unwrap();
        assert_eq!(key, "from-file");
        assert_eq!(src, KeySource::SecretsFile);
    }

    #[test]
    fn blank_values_fall_through() {
        let (_d, path) = secrets("MISTRAL_API_KEY = \"  \"");
        let (key, src) = resolve_from(Some(""), Some(&path), Some("from-env".into()), None).unwrap();
        assert_eq!(key, "from-env");
        assert_eq!(src, KeySource::Environment);
    }

    #[test]
    fn prompt_is_last_resort() {
        let ask = || Some("typed".to_string());
        let (key, src) = resolve_from(None, None, None, Some(&ask)).unwrap();
        assert_eq!(key, "typed");
        assert_eq!(src, KeySource::Prompt);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_secrets_file(&dir.path().join("absent.toml")).unwrap(), None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let (_d, path) = secrets("MISTRAL_API_KEY = ");
        assert!(matches!(
            read_secrets_file(&path),
            Err(DocExtractError::SecretsFile { .. })
        ));
    }

    #[test]
    fn nothing_found_names_every_source() {
        let err = resolve_from(None, Some(Path::new("/etc/none.toml")), None, None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--api-key"));
        assert!(msg.contains(API_KEY_VAR));
        assert!(msg.contains("/etc/none.toml"));
    }
}
