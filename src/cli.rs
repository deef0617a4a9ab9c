//! Command-line interface definitions for the verity_news engine.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! All arguments can be provided via command-line flags or environment variables.

use clap::Parser;

/// Command-line arguments for the verity_news batch driver.
///
/// The driver consumes a JSON file of crawler-delivered article records,
/// runs verification and correlation over them, and persists results under
/// the data directory.
///
/// # Examples
///
/// ```sh
/// # Basic usage
/// verity_news -i ./articles.json -d ./data
///
/// # With an explicit config file and forced re-verification
/// verity_news -i ./articles.json -d ./data -c ./verity.yaml --force
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a JSON file with an array of crawler article records
    #[arg(short, long)]
    pub input: String,

    /// Data directory for results, stories, ledger, and alerts
    #[arg(short, long, default_value = "./data")]
    pub data_dir: String,

    /// Path to the engine configuration YAML (re-read every pass)
    #[arg(short, long, env = "VERITY_CONFIG", default_value = "verity.yaml")]
    pub config: String,

    /// Re-verify articles that were already finalized
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(&[
            "verity_news",
            "--input",
            "./articles.json",
            "--data-dir",
            "./data",
        ]);

        assert_eq!(cli.input, "./articles.json");
        assert_eq!(cli.data_dir, "./data");
        assert_eq!(cli.config, "verity.yaml");
        assert!(!cli.force);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(&[
            "verity_news",
            "-i",
            "/tmp/articles.json",
            "-d",
            "/tmp/data",
            "-c",
            "/tmp/verity.yaml",
        ]);

        assert_eq!(cli.input, "/tmp/articles.json");
        assert_eq!(cli.data_dir, "/tmp/data");
        assert_eq!(cli.config, "/tmp/verity.yaml");
    }
}
