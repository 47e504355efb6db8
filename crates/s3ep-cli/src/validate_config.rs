//! `s3ep validate-config` — parse and validate a config file without
//! starting the server. Exits non-zero (via the returned `Err`) on any
//! parse or range-validation failure from `s3ep_core::config`.

use std::path::PathBuf;

use clap::Args;
use s3ep_core::Config;

#[derive(Args, Debug)]
pub struct ValidateConfigArgs {
    /// Path to the TOML config file.
    pub config: PathBuf,
}

pub fn run(args: &ValidateConfigArgs) -> anyhow::Result<u8> {
    let config = Config::load(&args.config)?;
    println!(
        "config ok: bind_address={} backend={} providers={} clients={}",
        config.bind_address,
        config.s3_backend.target_endpoint,
        config.encryption.providers.len(),
        config.s3_clients.len(),
    );
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
    fn run_succeeds_on_valid_config() {
        let file = write_config(MINIMAL);
        let args = ValidateConfigArgs {
            config: file.path().to_path_buf(),
        };
        assert_eq!(run(&args).unwrap(), 0);
    }

    #[test]
    fn run_fails_on_missing_file() {
        let args = ValidateConfigArgs {
            config: PathBuf::from("/nonexistent/s3ep.toml"),
        };
        assert!(run(&args).is_err());
    }

    #[test]
    fn run_fails_on_empty_backend_endpoint() {
        let bad = MINIMAL.replace(
            r#"target_endpoint = "http://localhost:9000""#,
            r#"target_endpoint = """#,
        );
        let file = write_config(&bad);
        let args = ValidateConfigArgs {
            config: file.path().to_path_buf(),
        };
        assert!(run(&args).is_err());
    }
}
