//! `kestrel-check config`: parse and validate a configuration file.

use std::path::Path;

use kestrel_core::RuntimeOptions;

/// Validate the file at `path`, returning the effective options
pub fn check(path: &Path) -> anyhow::Result<RuntimeOptions> {
    let options = super::load_options(Some(path))?;
    tracing::debug!(path = %path.display(), ?options, "configuration loaded");
    Ok(options)
}

/// Validate `path` and print the effective options
pub fn execute(path: &Path) -> anyhow::Result<()> {
    let options = check(path)?;
    println!("{}: ok", path.display());
    println!();
    print!("{}", options.to_toml_string()?);
    Ok(())
}
