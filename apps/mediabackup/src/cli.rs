use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Back up media files to a remote API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API endpoint recorded when a backup is first initialised
    #[arg(long, env = "MEDIABACKUP_ENDPOINT", global = true)]
    pub endpoint: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialise (if needed) and start or resume the backup
    Run {
        /// Path to the media directory
        directory: PathBuf,
    },
    /// Show backup status without uploading
    Status {
        /// Path to the media directory
        directory: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push the manifest to the server without uploading
    Sync {
        /// Path to the media directory
        directory: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run() {
        let cli = Cli::try_parse_from(["mediabackup", "run", "/media/photos"]).unwrap();
        match cli.command {
            Commands::Run { directory } => assert_eq!(directory, PathBuf::from("/media/photos")),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn status_json_flag() {
        let cli = Cli::try_parse_from(["mediabackup", "status", "--json", "."]).unwrap();
        assert!(matches!(cli.command, Commands::Status { json: true, .. }));
    }

    #[test]
    fn endpoint_is_global() {
        let cli = Cli::try_parse_from([
            "mediabackup",
            "sync",
            ".",
            "--endpoint",
            "http://localhost:8080",
        ])
        .unwrap();
        assert_eq!(cli.endpoint.as_deref(), Some("http://localhost:8080"));
        assert!(matches!(cli.command, Commands::Sync { .. }));
    }

    #[test]
    fn directory_is_required() {
        assert!(Cli::try_parse_from(["mediabackup", "run"]).is_err());
        assert!(Cli::try_parse_from(["mediabackup"]).is_err());
    }
}
