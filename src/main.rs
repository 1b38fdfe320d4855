use scenewright::app::{self, HostOptions};
use scenewright::config::EditorConfig;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config = match EditorConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("Invalid configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    log::info!("Scenewright editor");
    log::info!("   Tab toggles camera/entity mode, Esc exits");

    match app::run(config, HostOptions::default()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
