//! `s3ep fingerprint` — print every configured provider's alias,
//! kind, and fingerprint, so an operator can tell which alias a stored
//! object's `kek-fingerprint` metadata resolves to before rotating the
//! active provider.

use std::path::PathBuf;

use clap::Args;
use s3ep_api::state::AppState;
use s3ep_core::Config;

#[derive(Args, Debug)]
pub struct FingerprintArgs {
    /// Path to the TOML config file.
    pub config: PathBuf,
}

pub fn run(args: &FingerprintArgs) -> anyhow::Result<u8> {
    let config = Config::load(&args.config)?;
    let active_alias = config
        .encryption
        .encryption_method_alias
        .clone()
        .unwrap_or_default();
    let aliases: Vec<String> = config
        .encryption
        .providers
        .iter()
        .map(|p| p.alias.clone())
        .collect();

    let state = AppState::build(config)?;

    for alias in aliases {
        let provider = state
            .registry
            .by_alias(&alias)
            .expect("every configured alias resolves after AppState::build");
        let marker = if alias == active_alias { "*" } else { " " };
        println!(
            "{marker} {alias:<24} kind={:<6} fingerprint={}",
            provider.kind(),
            provider.fingerprint()
        );
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
bind_address = "0.0.0.0:8443"

[s3_backend]
target_endpoint = "http://localhost:9000"
region = "us-east-1"
access_key_id = "upstream"
secret_key = "upstream-secret-key-0123456789"

[[s3_clients]]
access_key_id = "clientaccesskey"
secret_key = "clientsecretkey0123456789"

[[encryption.providers]]
alias = "primary"
kind = "none"

encryption_method_alias = "primary"
"#;

    #[test]
    fn run_lists_configured_providers() {
        let file = write_config(MINIMAL);
        let args = FingerprintArgs {
            config: file.path().to_path_buf(),
        };
        assert_eq!(run(&args).unwrap(), 0);
    }

    #[test]
    fn run_fails_on_missing_file() {
        let args = FingerprintArgs {
            config: PathBuf::from("/nonexistent/s3ep.toml"),
        };
        assert!(run(&args).is_err());
    }
}
