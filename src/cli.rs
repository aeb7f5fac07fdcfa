//! Command-line interface definitions using clap

use clap::{Parser, Subcommand};

/// promoguard - engagement harvesting, fraud screening and payout workers
#[derive(Parser, Debug)]
#[command(name = "promoguard")]
#[command(version)]
#[command(
    about = "Harvests post metrics, screens bot traffic and settles promoter payouts",
    long_about = None
)]
pub struct Cli {
    /// Configuration file (default: config.toml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    /// Defaults to `run` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run every job on its schedule until Ctrl+C
    Run,

    /// Enqueue posts due for a metrics refresh (one pass)
    Schedule,

    /// Consume one batch from the harvest queue
    Harvest,

    /// Delete finished and dead-lettered queue messages past retention
    PurgeQueue,

    /// Analyze posts waiting for bot detection
    Analyze,

    /// Roll raw activity up into hourly rows
    RollupHourly {
        /// Hour to aggregate, RFC3339 or YYYY-MM-DDTHH (default: previous hour)
        #[arg(long)]
        hour: Option<String>,
    },

    /// Roll hourly rows up into daily metrics and classify users
    RollupDaily {
        /// UTC date, YYYY-MM-DD (default: yesterday)
        #[arg(long)]
        date: Option<String>,
    },

    /// Recalibrate the user activity threshold
    Calibrate,

    /// Settle posts cleared for payout
    Settle,

    /// Pay out daily activity earnings
    SettleDaily {
        /// UTC date, YYYY-MM-DD (default: yesterday)
        #[arg(long)]
        date: Option<String>,
    },

    /// Apply database migrations and exit
    Migrate,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output path (default: config.example.toml)
        output_path: Option<String>,

        /// Force overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_parses() {
        let cli = Cli::try_parse_from(["promoguard"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_rollup_daily_with_date_and_config() {
        let cli = Cli::try_parse_from([
            "promoguard",
            "rollup-daily",
            "--date",
            "2026-10-15",
            "-c",
            "prod.toml",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::RollupDaily {
                date: Some("2026-10-15".to_string())
            })
        );
        assert_eq!(cli.config.as_deref(), Some("prod.toml"));
    }

    #[test]
    fn test_config_generate() {
        let cli =
            Cli::try_parse_from(["promoguard", "config", "generate", "out.toml", "--force"])
                .unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Config {
                action: ConfigCommands::Generate {
                    output_path: Some("out.toml".to_string()),
                    force: true
                }
            })
        );
    }

    #[test]
    fn test_purge_queue_parses() {
        let cli = Cli::try_parse_from(["promoguard", "purge-queue"]).unwrap();
        assert_eq!(cli.command, Some(Commands::PurgeQueue));
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["promoguard", "payout-everyone"]).is_err());
    }
}
