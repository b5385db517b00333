mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use rf_core::config::Config;
use rf_core::{AccelerationMode, Quality, StreamRequest};

/// Load config from file, then apply environment overrides.
fn load_config(path: Option<&Path>) -> Config {
    let mut config = Config::load_or_default(path);
    config.apply_env_overrides();
    config
}

async fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path);

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting relayforge {}", env!("CARGO_PKG_VERSION"));
    rf_server::start(config).await?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise pick defaults based on the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "relayforge=trace,rf_av=trace,rf_server=debug,ffmpeg=debug,tower_http=debug".to_string()
        } else {
            "relayforge=info,rf_av=info,rf_server=info,ffmpeg=warn,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::CheckTools => {
            let config = load_config(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(&config))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::BuildArgs {
            url,
            quality,
            start,
            hw_accel,
        } => {
            let config = load_config(cli.config.as_deref());
            build_args(&config, &url, &quality, start.as_deref(), hw_accel)
        }
        Commands::Version => {
            println!("relayforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let registry = rf_av::ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in registry.check_all().await {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Streaming needs ffmpeg; metadata needs ffprobe.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            Config::load(p).with_context(|| format!("invalid config {}", p.display()))?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("✓ Configuration parsed with {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  ! {warning}");
        }
    }

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Acceleration: {}", config.transcode.hw_accel);
    println!(
        "  Max concurrent transcodes: {}",
        config
            .transcode
            .max_concurrent
            .map_or("unlimited".to_string(), |n| n.to_string())
    );
    println!(
        "  Max transcode duration: {}",
        config
            .transcode
            .max_duration_secs
            .map_or("unlimited".to_string(), |s| format!("{s}s"))
    );

    Ok(())
}

fn build_args(
    config: &Config,
    url: &str,
    quality: &str,
    start: Option<&str>,
    hw_accel: bool,
) -> Result<()> {
    // Same validation the server applies to a decoded url parameter.
    let source_url = rf_core::decode_source_url(&rf_core::encode_source_url(url))?;
    let quality: Quality = quality.parse().map_err(anyhow::Error::msg)?;
    let start = rf_core::parse_start_offset(start)?;
    let acceleration = if hw_accel {
        AccelerationMode::Vaapi
    } else {
        config.transcode.hw_accel
    };

    let request = StreamRequest::new(source_url, quality, acceleration).with_start(start);
    let args = rf_av::build_args(&request, &rf_av::EncoderSettings::from(&config.transcode));
    let program = config
        .tools
        .ffmpeg_path
        .as_deref()
        .map_or("ffmpeg".to_string(), |p| p.display().to_string());

    println!("{}", rf_av::command_line(&program, &args));
    Ok(())
}
