// Copyright 2026 cadcalls Contributors
// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use tracing::{error, info};

use cadcalls::artifact::truncate_chars;
use cadcalls::config::{load_settings, Overrides, RequestMethod};
use cadcalls::display::render_calls;
use cadcalls::portal::{Outcome, PortalClient, RequestParams};

#[derive(Parser)]
#[command(
    name = "cadcalls",
    about = "Fetch CAD calls data from a Tyler Police-to-Citizen portal",
    version,
    args_conflicts_with_subcommands = true,
    after_help = "Settings are read from --config, $CADCALLS_CONFIG, ./cadcalls.toml or the user config dir."
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Named portal profile from the [sites] table
    #[arg(long)]
    site: Option<String>,

    /// Portal base URL (e.g. "https://town.policetocitizen.com")
    #[arg(long)]
    base_url: Option<String>,

    /// Agency ID
    #[arg(long)]
    agency_id: Option<u32>,

    /// Include open calls
    #[arg(long, overrides_with = "no_open")]
    open: bool,

    /// Exclude open calls
    #[arg(long, overrides_with = "open")]
    no_open: bool,

    /// Include closed calls
    #[arg(long, overrides_with = "no_closed")]
    closed: bool,

    /// Exclude closed calls
    #[arg(long, overrides_with = "closed")]
    no_closed: bool,

    /// Number of records to retrieve
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    take: Option<u32>,

    /// Number of records to skip (for pagination)
    #[arg(long)]
    skip: Option<u32>,

    /// Search text to filter calls
    #[arg(long)]
    search: Option<String>,

    /// Also copy the saved response to this path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory for response and debug artifacts
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// HTTP method for the API request
    #[arg(long, value_enum, ignore_case = true)]
    method: Option<RequestMethod>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Suppress console output
    #[arg(long, short)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut overrides = Overrides {
        site: cli.site.clone(),
        base_url: cli.base_url.clone(),
        agency_id: cli.agency_id,
        request_method: cli.method,
        timeout_secs: cli.timeout,
        output_dir: cli.output_dir.clone(),
    };
    overrides.fill_from_env()?;
    let settings =
        load_settings(cli.config.as_deref(), &overrides).context("loading configuration")?;

    let mut params = RequestParams::from_defaults(settings.portal.agency_id, &settings.defaults);
    if let Some(open) = flag(cli.open, cli.no_open) {
        params.include_open = open;
    }
    if let Some(closed) = flag(cli.closed, cli.no_closed) {
        params.include_closed = closed;
    }
    if let Some(take) = cli.take {
        params.take = take;
    }
    if let Some(skip) = cli.skip {
        params.skip = skip;
    }
    if let Some(search) = cli.search {
        params.search_text = search;
    }

    let client = PortalClient::new(settings.portal);
    info!(
        portal = client.config().base_url(),
        agency_id = params.agency_id,
        "starting CAD calls retrieval"
    );

    let exchange = match client.fetch(&params).await {
        Ok(exchange) => exchange,
        Err(e) if e.is_no_response() => {
            error!("{e}");
            error!("request failed with status: No response");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    let data = match exchange.outcome() {
        Outcome::Data(data) => data,
        Outcome::HttpStatus(status) => {
            error!("request failed with status: {status}");
            if !exchange.response.body.is_empty() {
                error!(
                    "error details: {}",
                    truncate_chars(&exchange.response.body, 200)
                );
            }
            return Ok(ExitCode::FAILURE);
        }
        Outcome::NotJson => {
            error!("response is not valid JSON");
            return Ok(ExitCode::FAILURE);
        }
    };

    if !cli.quiet {
        let stdout = std::io::stdout();
        render_calls(&data, &mut stdout.lock()).context("writing call summary")?;
    }

    if let Some(dest) = &cli.output {
        if exchange.copy_to(dest)? {
            info!(path = %dest.display(), "copied data");
        }
    }

    info!("CAD calls data successfully retrieved");
    Ok(ExitCode::SUCCESS)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "cadcalls", &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }

    init_tracing(&cli);

    // Consistent exit codes: 0=success, 1=error
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
