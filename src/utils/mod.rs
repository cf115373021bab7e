//! Utility functions for liftoff

use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file names looked up in the working directory
pub const CONFIG_FILE_NAMES: [&str; 3] = ["liftoff.yaml", "liftoff.yml", "liftoff.json"];

/// Ensure a directory exists, creating it if necessary
pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    } else if !path.is_dir() {
        return Err(anyhow!("Path exists but is not a directory: {:?}", path));
    }
    Ok(())
}

/// Get the XDG config directory for liftoff
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("liftoff");

    Ok(config_dir)
}

/// Candidate configuration files, in lookup order
pub fn default_config_paths(base: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = CONFIG_FILE_NAMES
        .iter()
        .map(|name| base.join(name))
        .collect();
    if let Ok(config_dir) = get_config_dir() {
        paths.push(config_dir.join(CONFIG_FILE_NAMES[0]));
    }
    paths
}

/// Expand `~` and `$VAR` in a plugin or framework path
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    if !path_str.starts_with('~') && !path_str.contains('$') {
        return Ok(path.to_path_buf());
    }

    let expanded = shellexpand::full(&path_str)
        .map_err(|e| anyhow!("Failed to expand {:?}: {}", path, e))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        ensure_directory(&nested).unwrap();
        assert!(nested.is_dir());

        let file = temp_dir.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(ensure_directory(&file).is_err());
    }

    #[test]
    fn test_expand_plain_path_is_unchanged() {
        let path = Path::new("./plugins/session");
        assert_eq!(expand_path(path).unwrap(), PathBuf::from("./plugins/session"));
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_path(Path::new("~/plugins")).unwrap();
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("plugins"));
    }

    #[test]
    fn test_expand_unknown_variable_fails() {
        assert!(expand_path(Path::new("$LIFTOFF_SURELY_UNSET_VARIABLE/x")).is_err());
    }

    #[test]
    fn test_default_config_paths_order() {
        let paths = default_config_paths(Path::new("/srv/app"));
        assert_eq!(paths[0], PathBuf::from("/srv/app/liftoff.yaml"));
        assert_eq!(paths[2], PathBuf::from("/srv/app/liftoff.json"));
    }
}
