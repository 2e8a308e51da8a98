//! Config command implementation: inspect application settings.
use crate::cli::{ConfigAction, ConfigArgs};
use crate::config::SettingsService;
use crate::Result;

/// Execute the `config` subcommand.
pub fn execute(args: ConfigArgs, settings_service: &dyn SettingsService) -> Result<()> {
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let settings = settings_service.settings()?;
            print!("{}", toml::to_string(&settings)?);
        }
        ConfigAction::Path => {
            println!("{}", settings_service.settings_file_path()?.display());
        }
    }
    Ok(())
}
