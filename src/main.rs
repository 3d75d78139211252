use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;

use plotline::{
    app::load_config,
    cli::{handle_command, instruction_or_default, read_instruction, Cli},
    runtime::ChartPipeline,
    utils::{init_logger, log_error, log_info},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials for models and the mail server live in .env
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_logger(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dataset) = &cli.dataset {
        config.pipeline.dataset = dataset.clone();
    }

    if let Some(command) = &cli.command {
        if handle_command(command, &config).await? {
            return Ok(());
        }
    }

    let instruction = match &cli.prompt {
        Some(prompt) => instruction_or_default(prompt),
        None => {
            let stdin = std::io::stdin();
            let interactive = stdin.is_terminal();
            read_instruction(&mut stdin.lock(), interactive)?
        }
    };

    let pipeline = ChartPipeline::from_config(config)?;
    log_info("📈", format!("Charting: {}", instruction));

    let summary = pipeline.run(&instruction).await;
    println!("{}", summary.format(cli.output_format));

    if !summary.succeeded() {
        log_error("❌", "Run ended early; see the summary above");
        std::process::exit(1);
    }

    Ok(())
}
