use anyhow::{Context, Result};

use streamcheck::{open_with_system, Config};

pub fn cmd_open(config: &Config) -> Result<()> {
    let valid = config.valid_path();
    open_with_system(&valid).with_context(|| format!("Could not open {}", valid.display()))?;
    println!("📂 Opened {}", valid.display());
    Ok(())
}
