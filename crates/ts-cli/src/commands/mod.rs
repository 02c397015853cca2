pub mod catalog;
pub mod init_catalog;
pub mod simulate;

use std::fs;
use std::path::Path;

use ts_simulation::{Catalog, SimConfig};

/// Load a catalog file, or the built-in catalog when no path is given.
fn load_catalog(path: Option<&Path>) -> Result<Catalog, String> {
    let Some(path) = path else {
        return Ok(Catalog::builtin());
    };
    let json = fs::read_to_string(path)
        .map_err(|e| format!("cannot read catalog {}: {e}", path.display()))?;
    Catalog::from_json(&json).map_err(|e| format!("{}: {e}", path.display()))
}

/// Load a config file, or the defaults when no path is given.
fn load_config(path: Option<&Path>) -> Result<SimConfig, String> {
    let Some(path) = path else {
        return Ok(SimConfig::default());
    };
    let json = fs::read_to_string(path)
        .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
    SimConfig::from_json(&json).map_err(|e| format!("{}: {e}", path.display()))
}

/// Format a money amount.
fn money(amount: f64) -> String {
    format!("{amount:.2}")
}
