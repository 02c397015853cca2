use std::fs;
use std::path::Path;

use ts_simulation::Catalog;

pub fn run(path: &Path, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!(
            "'{}' already exists (use --force to overwrite)",
            path.display()
        ));
    }

    let json = Catalog::builtin()
        .to_json()
        .map_err(|e| format!("cannot serialize catalog: {e}"))?;
    fs::write(path, json).map_err(|e| format!("cannot write {}: {e}", path.display()))?;

    println!("Wrote built-in catalog to {}", path.display());
    println!();
    println!("Next steps:");
    println!("  # Edit the file to add commodities and blueprints");
    println!("  township catalog --catalog {}", path.display());
    println!("  township simulate --catalog {}", path.display());

    Ok(())
}
