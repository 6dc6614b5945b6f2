use std::path::Path;

use anyhow::Result;

use streamcheck::config::{config_path, Config};

pub fn cmd_config(config: &Config, override_path: Option<&Path>) -> Result<()> {
    let path = override_path.map_or_else(config_path, Path::to_path_buf);
    let status = if path.exists() { "" } else { " (not present, using defaults)" };

    println!("# {}{status}", path.display());
    print!("{}", config.to_toml_string()?);
    Ok(())
}
