use anyhow::Result;
use log::info;

use meteo_bridge::cli::{build_cli, handle_subcommands, load_config, run_station};
use meteo_bridge::output::create_formatter;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = build_cli().get_matches();
    if handle_subcommands(&matches).await? {
        return Ok(());
    }

    info!("🌦️  meteo_bridge v{}", meteo_bridge::VERSION);
    let config = load_config(&matches)?;
    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("console");

    run_station(config, create_formatter(format)?).await
}
