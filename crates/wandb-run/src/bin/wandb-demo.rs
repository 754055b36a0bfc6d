use std::f64::consts::PI;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use wandb_run::{ClientSettings, RunBuilder};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Log a sine wave to a wandb run through a local grpc-server backend."
)]
struct Cli {
    /// Override the config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Reduce logging to errors only
    #[arg(short, long)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
    /// Project the run belongs to
    #[arg(long)]
    project: Option<String>,
    /// Display name of the run
    #[arg(long)]
    name: Option<String>,
    /// Backend gRPC address
    #[arg(long)]
    address: Option<String>,
    /// Backend gRPC port
    #[arg(short, long)]
    port: Option<u16>,
    /// Leave stdout alone instead of capturing it
    #[arg(long = "no-capture")]
    no_capture: bool,
    /// Print the effective settings and exit
    #[arg(long = "show-config")]
    show_config: bool,
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut settings = ClientSettings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(address) = &cli.address {
        settings.address = address.clone();
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if cli.no_capture {
        settings.capture_output = false;
    }

    if cli.show_config {
        print!("{}", settings.to_toml().context("rendering settings")?);
        return Ok(());
    }

    println!("Hello from wandb in Rust using gRPC!");

    let mut builder = RunBuilder::from_settings(&settings)
        .config(json!({"data1": 1, "data2": "SOME VALUE"}));
    if let Some(project) = &cli.project {
        builder = builder.project(project);
    }
    if let Some(name) = &cli.name {
        builder = builder.name(name);
    }

    println!("Creating run");
    let mut run = builder.build().context("starting run")?;
    run.print_run_info();

    let mut i = 0.0_f64;
    while i < 2.0 * PI {
        let entry = json!({"value": i.sin()});
        println!("{entry}");
        run.log(&entry).context("logging history")?;
        i += 0.05;
    }

    println!(
        "Finished your run ({}) at: {}",
        run.identity().display_name,
        run.run_url()
    );

    let report = run.finish(0).context("finishing run")?;
    for failure in &report.failures {
        warn!("teardown step {:?} failed: {}", failure.step, failure.error);
    }
    info!(
        "backend exited with {:?} after {} step(s)",
        report.backend_exit_code,
        run.step()
    );
    Ok(())
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wandb_run={level},wandb_demo={level}")));

    // Logs go to stderr; stdout belongs to the run and may be captured.
    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_ansi(io::stderr().is_terminal()),
            )
            .try_init()
            .ok();
    }
}
