use std::path::Path;

/// Write the config template to `path` unless a file is already there.
pub fn init(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!(
            "{} already exists. Remove it first or pass a different --config.",
            path.display()
        );
    }
    super::write_template(path)?;
    super::print_fill_in_hint(path);
    Ok(())
}
