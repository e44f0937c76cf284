//! Command-line interface definitions for settingsctl.

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use logging::LogArgs;

/// Command-line interface for the `settingsctl` binary.
#[derive(Parser, Debug)]
#[command(
    name = "settingsctl",
    about = "Inspect and edit settings stores",
    version
)]
pub struct Cli {
    /// Logging controls shared across binaries.
    #[command(flatten)]
    pub log: LogArgs,

    /// Which store to operate on.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands, one per store kind.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Operate on a JSON settings file.
    #[command(subcommand)]
    File(FileCommand),
    /// Operate on a schema-validated store.
    Schema(SchemaArgs),
}

/// File store operations.
#[derive(Subcommand, Debug)]
pub enum FileCommand {
    /// Print the value of a key.
    Get {
        /// Settings document.
        path: PathBuf,
        /// Key to read.
        key: String,
    },
    /// Assign a key. The value is parsed as JSON, falling back to a plain string.
    Set {
        /// Settings document.
        path: PathBuf,
        /// Key to write.
        key: String,
        /// New value.
        value: String,
    },
    /// List keys in document order.
    Keys {
        /// Settings document.
        path: PathBuf,
    },
    /// Print every external change to the document until interrupted.
    Watch {
        /// Settings document.
        path: PathBuf,
        /// How often to poll for watch events.
        #[arg(
            long,
            value_parser = humantime::parse_duration,
            default_value = "200ms",
            value_name = "DURATION"
        )]
        interval: Duration,
        /// Exit after this many changed keys have been reported.
        #[arg(long, value_name = "N")]
        max_changes: Option<usize>,
    },
}

/// Arguments for the `schema` subcommand.
#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Directory of JSON schema definitions [default: <data-dir>/schemas]
    #[arg(long, value_name = "DIR")]
    pub schema_dir: Option<PathBuf>,

    /// Directory holding persisted values [default: $XDG_CONFIG_HOME/settingsctl]
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Operation to run.
    #[command(subcommand)]
    pub command: SchemaCommand,
}

/// Schema store operations.
#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// Print the effective value of a key.
    Get {
        /// Schema id.
        schema: String,
        /// Key to read.
        key: String,
    },
    /// Validate and assign a key. The value is parsed as JSON, falling back to a plain string.
    Set {
        /// Schema id.
        schema: String,
        /// Key to write.
        key: String,
        /// New value.
        value: String,
    },
    /// Restore a key to its default.
    Reset {
        /// Schema id.
        schema: String,
        /// Key to reset.
        key: String,
    },
    /// Describe the accepted values of a key.
    Range {
        /// Schema id.
        schema: String,
        /// Key to describe.
        key: String,
    },
    /// List declared keys with their effective values.
    Keys {
        /// Schema id.
        schema: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_watch_with_duration() {
        let cli = Cli::try_parse_from([
            "settingsctl",
            "--debug",
            "file",
            "watch",
            "s.json",
            "--interval",
            "1s",
            "--max-changes",
            "3",
        ])
        .unwrap();
        assert!(cli.log.debug);
        match cli.command {
            Commands::File(FileCommand::Watch {
                interval,
                max_changes,
                ..
            }) => {
                assert_eq!(interval, Duration::from_secs(1));
                assert_eq!(max_changes, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_schema_dirs() {
        let cli = Cli::try_parse_from([
            "settingsctl",
            "schema",
            "--schema-dir",
            "/tmp/schemas",
            "range",
            "org.example",
            "size",
        ])
        .unwrap();
        let Commands::Schema(args) = cli.command else {
            panic!("expected schema command");
        };
        assert_eq!(args.schema_dir, Some(PathBuf::from("/tmp/schemas")));
        assert!(args.data_dir.is_none());
        assert!(matches!(args.command, SchemaCommand::Range { .. }));
    }

    #[test]
    fn log_flags_conflict() {
        let args = ["settingsctl", "--trace", "--debug", "file", "keys", "s.json"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
