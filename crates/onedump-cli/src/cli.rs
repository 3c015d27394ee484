//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// onedump - dump OneNote notebooks to local files
#[derive(Debug, Parser)]
#[command(name = "onedump")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Ignore the saved session and re-authenticate
    #[arg(long, short = 'n', global = true)]
    pub new_session: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List available notebooks
    List,

    /// Dump a notebook's pages to a local directory
    Dump {
        /// Display name of the notebook to dump
        notebook: String,

        /// Only dump the section with this display name
        #[arg(long)]
        section: Option<String>,

        /// Output directory for the dump
        #[arg(long, short = 'o', default_value = "output")]
        output: PathBuf,

        /// Stop after this page position (1-indexed, counted after the
        /// section filter)
        #[arg(long)]
        max_pages: Option<usize>,

        /// First page position to export (1-indexed, counted after the
        /// section filter); earlier pages are listed but skipped
        #[arg(long)]
        start_page: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn dump_parses_flags() {
        let cli = Cli::parse_from([
            "onedump",
            "--new-session",
            "dump",
            "Work",
            "--section",
            "Beta",
            "--max-pages",
            "10",
        ]);
        assert!(cli.new_session);
        match cli.command {
            Command::Dump {
                notebook,
                section,
                max_pages,
                start_page,
                ..
            } => {
                assert_eq!(notebook, "Work");
                assert_eq!(section.as_deref(), Some("Beta"));
                assert_eq!(max_pages, Some(10));
                assert_eq!(start_page, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
