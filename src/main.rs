use clap::Parser;
use gpio_lights::cli::Cli;
use gpio_lights::config::ServerConfig;
use gpio_lights::error::LightsError;
use gpio_lights::logging::{init_logging, log_file_path, LoggingConfig};
use gpio_lights::server::LightServer;
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut log_config = LoggingConfig::from_args(cli.quiet, cli.verbose > 0, cli.json);

    // LIGHTS_LOG_FILE=<path> logs to a file; an empty value picks the default path
    if let Ok(path) = std::env::var("LIGHTS_LOG_FILE") {
        let path = if path.is_empty() {
            log_file_path()
        } else {
            Ok(PathBuf::from(path))
        };
        match path {
            Ok(path) => log_config.file_output = Some(path),
            Err(e) => eprintln!("Warning: logging to stdout, no log file available: {}", e),
        }
    }

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let mut config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => exit_with(LightsError::from(e)),
    };
    cli.apply_to(&mut config);

    let server = match LightServer::new(config) {
        Ok(server) => server,
        Err(e) => exit_with_anyhow(e),
    };

    if let Err(e) = server.run().await {
        exit_with_anyhow(e);
    }
}

fn exit_with(e: LightsError) -> ! {
    let error_response = e.to_error_response();
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&error_response).unwrap_or_else(|_| e.to_string())
    );
    std::process::exit(1);
}

fn exit_with_anyhow(e: anyhow::Error) -> ! {
    match e.downcast::<LightsError>() {
        Ok(e) => exit_with(e),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        },
    }
}
