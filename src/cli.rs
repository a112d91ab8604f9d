//! Minimal CLI parsing for sync commands and path overrides.

use std::env;
use std::path::PathBuf;

/// What the invocation should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the sync pipeline unless data is already present
    Sync,
    /// Clear persisted data and the cached archive, then sync fresh
    Refresh,
    /// Reset the database entirely, schema included
    Clear,
    /// Search persisted shows and print matches with their recordings
    Show(String),
}

#[derive(Debug, Default)]
pub struct CliOptions {
    pub command: Option<Command>,
    pub database_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    fn parse(args: impl Iterator<Item = String>) -> Self {
        let mut options = CliOptions::default();
        let mut args = args.peekable();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "sync" => options.command = Some(Command::Sync),
                "refresh" => options.command = Some(Command::Refresh),
                "clear" => options.command = Some(Command::Clear),
                "show" => {
                    if let Some(query) = args.next() {
                        options.command = Some(Command::Show(query));
                    }
                }
                "--db" => {
                    if let Some(value) = args.next() {
                        options.database_path = Some(PathBuf::from(value));
                    }
                }
                "--data-dir" => {
                    if let Some(value) = args.next() {
                        options.data_dir = Some(PathBuf::from(value));
                    }
                }
                _ => {}
            }
        }
        options
    }
}

pub fn usage() -> &'static str {
    "usage: tapevault [--db PATH] [--data-dir DIR] <sync|refresh|clear|show QUERY>"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliOptions {
        CliOptions::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse(&["sync"]).command, Some(Command::Sync));
        assert_eq!(parse(&["refresh"]).command, Some(Command::Refresh));
        assert_eq!(parse(&["clear"]).command, Some(Command::Clear));
        assert_eq!(
            parse(&["show", "barton hall"]).command,
            Some(Command::Show("barton hall".to_string()))
        );
        assert_eq!(parse(&[]).command, None);
    }

    #[test]
    fn test_overrides() {
        let options = parse(&["--db", "/tmp/x.db", "--data-dir", "/tmp/data", "sync"]);
        assert_eq!(options.database_path, Some(PathBuf::from("/tmp/x.db")));
        assert_eq!(options.data_dir, Some(PathBuf::from("/tmp/data")));
        assert_eq!(options.command, Some(Command::Sync));
    }
}
