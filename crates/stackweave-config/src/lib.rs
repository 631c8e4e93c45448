pub mod error;

pub use error::*;

use serde::Deserialize;
use std::path::{Path, PathBuf};

const CANDIDATES: [&str; 4] = [
    "stackweave.local.yaml",
    ".stackweave.local.yaml",
    "stackweave.yaml",
    ".stackweave.yaml",
];

/// Find the stack file
///
/// Search order:
/// 1. `STACKWEAVE_CONFIG` (direct path)
/// 2. current directory: stackweave.local.yaml, .stackweave.local.yaml, stackweave.yaml, .stackweave.yaml
/// 3. the same names inside `./.stackweave/`
/// 4. `~/.config/stackweave/stackweave.yaml`
pub fn find_stack_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var("STACKWEAVE_CONFIG") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "STACKWEAVE_CONFIG points at a missing file");
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let stack_dir = current_dir.join(".stackweave");
    if stack_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = stack_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stackweave").join("stackweave.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::StackFileNotFound)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StackFile {
    name: String,
    #[serde(default = "default_location")]
    location: String,
    assets: Option<PathBuf>,
}

fn default_location() -> String {
    "eastus".to_string()
}

/// Loaded stack settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    /// Stack name, used as the graph name
    pub name: String,
    /// Default region for resources that take one
    pub location: String,
    /// Directory holding `blobs/` and `docker/`
    pub asset_dir: PathBuf,
    /// Directory the stack file lives in; state is kept under it
    pub root: PathBuf,
}

impl StackConfig {
    /// Parse a stack file; relative `assets` paths are resolved against its directory
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: StackFile = serde_yaml::from_str(&content).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if file.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                message: "name must not be empty".to_string(),
            });
        }

        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let asset_dir = match file.assets {
            Some(assets) if assets.is_absolute() => assets,
            Some(assets) => root.join(assets),
            None => root.clone(),
        };

        tracing::debug!(stack = %file.name, path = %path.display(), "Loaded stack file");
        Ok(Self {
            name: file.name,
            location: file.location,
            asset_dir,
            root,
        })
    }

    /// Find and load the stack file
    pub fn discover() -> Result<Self> {
        Self::load(&find_stack_file()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_find_stack_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stackweave.yaml"), "name: test").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_stack_file();
        assert!(result.is_ok());
        assert!(result.unwrap().ends_with("stackweave.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_stack_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stackweave.yaml"), "name: shared").unwrap();
        fs::write(temp_dir.path().join("stackweave.local.yaml"), "name: local").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_stack_file().unwrap();
        assert!(result.ends_with("stackweave.local.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_stack_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let stack_dir = temp_dir.path().join(".stackweave");
        fs::create_dir(&stack_dir).unwrap();
        fs::write(stack_dir.join("stackweave.yaml"), "name: nested").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_stack_file().unwrap();
        assert!(result.ends_with(".stackweave/stackweave.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_stack_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "name: custom").unwrap();

        unsafe {
            std::env::set_var("STACKWEAVE_CONFIG", config_path.to_str().unwrap());
        }

        let result = find_stack_file().unwrap();
        assert_eq!(result, config_path);

        unsafe {
            std::env::remove_var("STACKWEAVE_CONFIG");
        }
    }

    /// The global fallback is read from the config dir without creating it
    #[test]
    #[serial]
    #[cfg(target_os = "linux")]
    fn test_find_stack_file_global_fallback() {
        let project_dir = tempfile::tempdir().unwrap();
        let config_home = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let original_home = std::env::var_os("XDG_CONFIG_HOME");

        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", config_home.path());
        }
        std::env::set_current_dir(&project_dir).unwrap();

        assert!(matches!(
            find_stack_file(),
            Err(ConfigError::StackFileNotFound)
        ));
        assert!(!config_home.path().join("stackweave").exists());

        let global_dir = config_home.path().join("stackweave");
        fs::create_dir_all(&global_dir).unwrap();
        fs::write(global_dir.join("stackweave.yaml"), "name: global").unwrap();
        assert_eq!(
            find_stack_file().unwrap(),
            global_dir.join("stackweave.yaml")
        );

        std::env::set_current_dir(original_dir).unwrap();
        unsafe {
            match original_home {
                Some(home) => std::env::set_var("XDG_CONFIG_HOME", home),
                None => std::env::remove_var("XDG_CONFIG_HOME"),
            }
        }
    }

    #[test]
    fn test_load_resolves_assets_relative_to_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackweave.yaml");
        fs::write(&path, "name: beckshome\nassets: ./assets\n").unwrap();

        let config = StackConfig::load(&path).unwrap();
        assert_eq!(config.name, "beckshome");
        assert_eq!(config.location, "eastus");
        assert_eq!(config.asset_dir, temp_dir.path().join("./assets"));
        assert_eq!(config.root, temp_dir.path());
    }

    #[test]
    fn test_load_defaults_assets_to_file_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackweave.yaml");
        fs::write(&path, "name: beckshome\nlocation: westeurope\n").unwrap();

        let config = StackConfig::load(&path).unwrap();
        assert_eq!(config.location, "westeurope");
        assert_eq!(config.asset_dir, temp_dir.path());
    }

    #[test]
    fn test_load_rejects_unknown_keys_and_empty_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackweave.yaml");

        fs::write(&path, "name: x\nregion: eastus\n").unwrap();
        assert!(matches!(
            StackConfig::load(&path),
            Err(ConfigError::Invalid { .. })
        ));

        fs::write(&path, "name: '  '\n").unwrap();
        assert!(matches!(
            StackConfig::load(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
