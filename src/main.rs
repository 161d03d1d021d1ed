use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use playlist_scribe::cli::RunOptions;
use playlist_scribe::output::{self, ProgressReporter};
use playlist_scribe::{utils, Cli, Commands, Config, LogFormat, Pipeline, SourceRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format);

    let mut config = Config::load().await?;

    let (references, options) = match cli.command {
        Commands::Run { playlists, options } => (playlists, options),
        Commands::Single { reference, options } => (vec![reference], options),
        Commands::Folder { folders, options } => {
            let references = folders
                .iter()
                .map(|folder| folder.to_string_lossy().into_owned())
                .collect();
            (references, options)
        }
        Commands::Check => {
            let registry = SourceRegistry::new(&config.tools);
            println!("Sources: {}", registry.list_platforms().join(", "));

            let missing = missing_tools(&config).await;
            if missing.is_empty() {
                println!("All external tools found");
            } else {
                println!("Missing tools:");
                for tool in &missing {
                    println!("  • {}", tool);
                }
                std::process::exit(1);
            }
            return Ok(());
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Configuration file: {}", Config::config_path()?.display());
                println!("Run with --show to print the current values");
            }
            return Ok(());
        }
    };

    run(&mut config, &references, &options, cli.quiet, cli.log_format).await
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_filter = if verbose {
        "playlist_scribe=debug"
    } else {
        "playlist_scribe=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

async fn missing_tools(config: &Config) -> Vec<String> {
    utils::check_dependencies(&config.tools.yt_dlp, &config.tools.ffmpeg, &config.transcriber.program).await
}

async fn run(
    config: &mut Config,
    references: &[String],
    options: &RunOptions,
    quiet: bool,
    log_format: LogFormat,
) -> Result<()> {
    options.apply(config);
    config.validate()?;

    // Missing tools are reported, not fatal: items that need them fail individually
    let missing = missing_tools(config).await;
    if !missing.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - affected items will be skipped)");
    }

    let pipeline = Pipeline::from_config(config).with_progress(ProgressReporter::from_quiet(quiet));
    let summary = pipeline.run(references).await?;

    match log_format {
        LogFormat::Pretty => output::print_summary(&summary),
        LogFormat::Json => output::print_summary_json(&summary)?,
    }

    Ok(())
}
