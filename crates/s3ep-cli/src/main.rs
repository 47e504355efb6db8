//! # s3ep CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use s3ep_cli::fingerprint::{run as run_fingerprint, FingerprintArgs};
use s3ep_cli::serve::{run as run_serve, ServeArgs};
use s3ep_cli::validate_config::{run as run_validate_config, ValidateConfigArgs};

/// s3ep — transparent S3-compatible client-side encryption proxy.
#[derive(Parser, Debug)]
#[command(name = "s3ep", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a config file and run the proxy.
    Serve(ServeArgs),

    /// Parse and validate a config file without starting the server.
    ValidateConfig(ValidateConfigArgs),

    /// Print the alias, kind, and fingerprint of every configured
    /// encryption provider.
    Fingerprint(FingerprintArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::debug!("s3ep CLI starting");

    let result = match &cli.command {
        Commands::Serve(args) => run_serve(args),
        Commands::ValidateConfig(args) => run_validate_config(args),
        Commands::Fingerprint(args) => run_fingerprint(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parse_serve() {
        let cli = Cli::try_parse_from(["s3ep", "serve", "s3ep.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve(_)));
        if let Commands::Serve(args) = cli.command {
            assert_eq!(args.config, std::path::PathBuf::from("s3ep.toml"));
        }
    }

    #[test]
    fn cli_parse_validate_config() {
        let cli = Cli::try_parse_from(["s3ep", "validate-config", "s3ep.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn cli_parse_fingerprint() {
        let cli = Cli::try_parse_from(["s3ep", "fingerprint", "s3ep.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Fingerprint(_)));
    }

    #[test]
    fn cli_parse_no_subcommand_errors() {
        assert!(Cli::try_parse_from(["s3ep"]).is_err());
    }

    #[test]
    fn cli_parse_invalid_subcommand_errors() {
        assert!(Cli::try_parse_from(["s3ep", "nonexistent"]).is_err());
    }

    #[test]
    fn cli_parse_verbose_levels() {
        let cli0 = Cli::try_parse_from(["s3ep", "fingerprint", "s3ep.toml"]).unwrap();
        assert_eq!(cli0.verbose, 0);

        let cli1 = Cli::try_parse_from(["s3ep", "-v", "fingerprint", "s3ep.toml"]).unwrap();
        assert_eq!(cli1.verbose, 1);

        let cli2 = Cli::try_parse_from(["s3ep", "-vv", "fingerprint", "s3ep.toml"]).unwrap();
        assert_eq!(cli2.verbose, 2);
    }

    #[test]
    fn cli_debug_impl() {
        let cli = Cli::try_parse_from(["s3ep", "fingerprint", "s3ep.toml"]).unwrap();
        let debug = format!("{cli:?}");
        assert!(debug.contains("Cli"));
    }
}
