//! `kestrel-check` subcommands

pub mod classes;
pub mod config;

use std::path::Path;

use anyhow::Context;
use kestrel_core::{Runtime, RuntimeOptions};

/// Load options from `path`, or the defaults when no path is given
pub fn load_options(path: Option<&Path>) -> anyhow::Result<RuntimeOptions> {
    match path {
        Some(path) => RuntimeOptions::from_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(RuntimeOptions::default()),
    }
}

/// Build a runtime with the window manager classes registered
pub fn build_runtime(options: RuntimeOptions) -> anyhow::Result<Runtime> {
    let rt = Runtime::with_options(options).context("invalid runtime options")?;
    kestrel_classes::register_all(&rt).context("failed to register classes")?;
    Ok(rt)
}
