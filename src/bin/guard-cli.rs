use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use habitflow_guard::config::load_config;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Operations CLI for the HabitFlow guard", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show third-party credential status from a running guard
    Keys,
    /// Load and validate a configuration file without starting the guard
    CheckConfig { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Keys => {
            let client = reqwest::Client::new();
            let res = client
                .get(format!("{}/api/validate-keys", cli.url.trim_end_matches('/')))
                .header(reqwest::header::ACCEPT, "application/json")
                .header(reqwest::header::USER_AGENT, "guard-cli")
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::CheckConfig { path } => match load_config(&path) {
            Ok(config) => {
                println!("{} is valid", path.display());
                println!("  environment:   {:?}", config.environment);
                println!("  bind address:  {}", config.listener.bind_address);
                println!(
                    "  rate limit:    {} requests / {} s",
                    config.rate_limit.max_requests, config.rate_limit.window_secs
                );
                println!("  tier rules:    {}", config.sensitivity.rules.len());
            }
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: guard returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("{}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
