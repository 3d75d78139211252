use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "plotline")]
#[command(version)]
#[command(about = "Turns a charting instruction into a reviewed chart and mails the report", long_about = None)]
pub struct Cli {
    /// Path to configuration file (replaces the global and local files)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// CSV dataset to chart (overrides the configured one)
    #[arg(short, long)]
    pub dataset: Option<PathBuf>,

    /// Charting instruction; read from stdin when omitted
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Output format for the run summary
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the generate, reflect and deliver pipeline (default)
    Run,
    /// Write a default configuration and an example server list
    Init,
    /// Connect the tool servers and list their tools and resources
    Tools,
    /// List supported model ids and the role bindings
    Models,
    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON structured output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run_without_subcommand() {
        let cli = Cli::try_parse_from(["plotline"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.output_format, OutputFormat::Text);
        assert!(cli.prompt.is_none());
    }

    #[test]
    fn test_flags_and_subcommand() {
        let cli = Cli::try_parse_from([
            "plotline",
            "--dataset",
            "data.csv",
            "-p",
            "bar chart of sales",
            "--output-format",
            "json",
            "run",
        ])
        .unwrap();
        assert_eq!(cli.dataset, Some(PathBuf::from("data.csv")));
        assert_eq!(cli.prompt.as_deref(), Some("bar chart of sales"));
        assert_eq!(cli.output_format, OutputFormat::Json);
        assert_eq!(cli.command, Some(Commands::Run));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
