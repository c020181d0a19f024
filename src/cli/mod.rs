pub mod commands;

pub use commands::{build_cli, handle_subcommands, load_config, run_station};
