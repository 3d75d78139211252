use anyhow::{Context, Result};
use colored::Colorize;
use std::io::BufRead;
use std::time::Duration;

use crate::{
    app::{init_config, Config},
    constants::DEFAULT_INSTRUCTION,
    gateway::ToolGateway,
    models::ModelFactory,
};

use super::Commands;

/// Handle CLI subcommands
///
/// Returns `false` when the caller should go on with a pipeline run.
pub async fn handle_command(command: &Commands, config: &Config) -> Result<bool> {
    match command {
        Commands::Init => {
            println!("Initializing plotline configuration...");
            init_config()?;
            println!("Configuration initialized successfully!");
            Ok(true)
        }
        Commands::Tools => {
            list_tools(config).await?;
            Ok(true)
        }
        Commands::Models => {
            list_models(config);
            Ok(true)
        }
        Commands::Version => {
            show_version();
            Ok(true)
        }
        Commands::Run => Ok(false),
    }
}

/// Connect every configured tool server, print its capabilities, release it
pub async fn list_tools(config: &Config) -> Result<()> {
    let gateway = ToolGateway::new(
        config.gateway.on_conflict,
        Duration::from_secs(config.gateway.call_timeout_secs),
    );

    let connected = gateway.connect_all(&config.gateway.server_config).await;
    let listing = connected.map(|servers| {
        let mut out = format!("{} tool servers connected\n", servers);
        out.push_str("\nTools:\n");
        for tool in gateway.tools() {
            out.push_str(&format!("  • {} ({})", tool.name.green(), tool.server));
            if !tool.description.is_empty() {
                out.push_str(&format!(" - {}", tool.description));
            }
            out.push('\n');
        }
        out.push_str("\nResources:\n");
        for resource in gateway.resources() {
            out.push_str(&format!(
                "  • {} {} ({})\n",
                resource.name.cyan(),
                resource.uri.as_deref().unwrap_or(""),
                resource.server
            ));
        }
        out
    });
    gateway.cleanup().await;

    let listing = listing.with_context(|| {
        format!(
            "Failed to start tool servers from {}",
            config.gateway.server_config.display()
        )
    })?;
    print!("{}", listing);
    Ok(())
}

/// List supported models and what each role is bound to
pub fn list_models(config: &Config) {
    println!("Supported models:");
    for (id, target) in ModelFactory::list_supported() {
        let vision = if id.is_vision() { " [vision]" } else { "" };
        println!("  • {:<12} {}{}", id.id().green(), target, vision);
    }

    println!("\nRole bindings:");
    for (role, configured, resolved) in ModelFactory::role_bindings(&config.roles) {
        if configured == resolved.id() {
            println!("  • {:<10} {}", role, resolved);
        } else {
            println!(
                "  • {:<10} {} {}",
                role,
                resolved,
                format!("(unknown '{}', using fallback)", configured).as_str().yellow()
            );
        }
    }
}

/// Show version information
pub fn show_version() {
    println!("plotline v{}", env!("CARGO_PKG_VERSION"));
    println!("   Chart generation with self-repairing code and mailed reports");
}

/// Ask for the charting instruction on stdin
///
/// An empty answer, or closed stdin, yields the default instruction.
pub fn read_instruction(input: &mut impl BufRead, interactive: bool) -> Result<String> {
    if interactive {
        eprint!(
            "Describe the chart to create (empty for default):\n  [{}]\n> ",
            DEFAULT_INSTRUCTION
        );
    }
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(instruction_or_default(&line))
}

/// Trimmed answer, or the default instruction when it is blank
pub fn instruction_or_default(answer: &str) -> String {
    let answer = answer.trim();
    if answer.is_empty() {
        DEFAULT_INSTRUCTION.to_string()
    } else {
        answer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_answer_uses_default_instruction() {
        let mut input = "   \n".as_bytes();
        assert_eq!(read_instruction(&mut input, false).unwrap(), DEFAULT_INSTRUCTION);

        let mut closed = "".as_bytes();
        assert_eq!(read_instruction(&mut closed, false).unwrap(), DEFAULT_INSTRUCTION);
    }

    #[test]
    fn test_answer_is_trimmed() {
        let mut input = "  pie chart of card vs cash \nignored\n".as_bytes();
        assert_eq!(
            read_instruction(&mut input, false).unwrap(),
            "pie chart of card vs cash"
        );
    }

    #[tokio::test]
    async fn test_tools_fails_on_missing_server_list() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.gateway.server_config = dir.path().join("absent.json");
        assert!(list_tools(&config).await.is_err());
    }
}
