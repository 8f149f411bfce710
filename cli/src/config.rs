//! File loaders for the CLI: engine config (TOML), key files, drafts and
//! sandbox genesis (JSON).

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use ledgerflow::authority::InMemoryKeyStore;
use ledgerflow::config::EngineConfig;
use ledgerflow::ledger::GenesisConfig;
use ledgerflow::transaction::OperationDraft;

/// Load the engine config, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

/// Key file: a JSON object of `handle -> secret hex`.
pub fn load_keys(path: &Path) -> Result<InMemoryKeyStore> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    let secrets: BTreeMap<String, String> = serde_json::from_str(&text)
        .with_context(|| format!("key file {} is not a JSON object of strings", path.display()))?;
    InMemoryKeyStore::from_secrets(secrets)
        .with_context(|| format!("bad secret in key file {}", path.display()))
}

pub fn load_draft(path: &Path) -> Result<OperationDraft> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read draft {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid draft {}", path.display()))
}

pub fn load_genesis(path: Option<&Path>) -> Result<GenesisConfig> {
    let Some(path) = path else {
        return Ok(GenesisConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read genesis {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid genesis {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerflow::authority::{KeyHandle, KeyProvider};
    use ledgerflow::crypto::keys::KeyPair;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_config_path_yields_defaults() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let file = write_temp("submit_timeout_ms = 1500\nledger_offset = 8\n");
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.submit_timeout_ms, 1500);
        assert_eq!(config.ledger_offset, 8);
        assert_eq!(config.read_timeout_ms, EngineConfig::default().read_timeout_ms);
    }

    #[test]
    fn malformed_toml_names_the_file() {
        let file = write_temp("submit_timeout_ms = \"soon\"");
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("invalid config"));
    }

    #[test]
    fn key_file_loads_handles() {
        let pair = KeyPair::from_seed(&[9; 32]);
        let file = write_temp(&format!(r#"{{"ops": "{}"}}"#, pair.secret_hex()));
        let store = load_keys(file.path()).unwrap();
        let public = store.public_key(&KeyHandle::new("ops")).unwrap();
        assert_eq!(public, pair.public_key());
    }

    #[test]
    fn key_file_rejects_bad_hex() {
        let file = write_temp(r#"{"ops": "zz"}"#);
        assert!(load_keys(file.path()).is_err());
    }

    #[test]
    fn missing_genesis_is_empty_default() {
        let genesis = load_genesis(None).unwrap();
        assert!(genesis.accounts.is_empty());
    }
}
