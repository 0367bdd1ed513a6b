use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use outreach_lib::{execute_mailer, run_precheck, AppConfig, RunError};

#[derive(Parser)]
#[command(name = "outreach", about = "Send referral outreach emails from a contact list")]
struct Cli {
    /// Validate credentials.json and token.json, then exit
    #[arg(long)]
    precheck: bool,

    /// Compose and record everything, send nothing
    #[arg(long)]
    dry_run: bool,

    /// Daily send cap for this run (0 = no cap)
    #[arg(long, value_name = "N")]
    limit: Option<u32>,

    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_module("outreach_lib", LevelFilter::Debug);
        builder.filter_module("outreach", LevelFilter::Debug);
    }
    builder.format_timestamp_secs().init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_logging(cli.verbose);
            let err = RunError::from(e);
            log::error!("{}. {}", err, err.recovery_suggestion());
            return ExitCode::FAILURE;
        }
    };
    if cli.dry_run {
        config.dry_run = true;
    }
    if let Some(limit) = cli.limit {
        config.daily_limit = limit;
    }
    config.verbose |= cli.verbose;
    init_logging(config.verbose);

    if cli.precheck {
        return match run_precheck(&config).await {
            Ok(()) => {
                println!("Pre-flight credentials validation OK.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("Pre-flight credentials validation FAILED: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    match execute_mailer(&config).await {
        Ok(summary) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Run aborted: {}", e);
            eprintln!("{}", e.recovery_suggestion());
            if e.is_retryable() {
                eprintln!("The failure looks transient; the run can be retried as-is.");
            }
            ExitCode::from(e.exit_status())
        }
    }
}
