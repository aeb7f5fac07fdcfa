use clap::Parser;
use colored::Colorize;

use promoguard::cli::{Cli, Commands, ConfigCommands};
use promoguard::config::init_config;
use promoguard::errors::PromoGuardError;
use promoguard::runtime::{generate_config, run_command};
use promoguard::system::init_logging;

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<PromoGuardError>() {
        Some(pg) => eprintln!("{}\n  {:#}", pg.format_colored(), err),
        None => eprintln!("{} {:#}", "[ERROR]".red().bold(), err),
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    // 生成示例配置不依赖现有配置和数据库
    if let Commands::Config {
        action: ConfigCommands::Generate { output_path, force },
    } = &command
    {
        if let Err(e) = generate_config(output_path.as_deref(), *force) {
            report_error(&e);
            std::process::exit(1);
        }
        return;
    }

    let config = match init_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.format_colored());
            std::process::exit(1);
        }
    };

    let _log_guard = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e.format_colored());
            std::process::exit(1);
        }
    };

    if let Err(e) = run_command(command, config).await {
        tracing::error!("{:#}", e);
        report_error(&e);
        std::process::exit(1);
    }
}
