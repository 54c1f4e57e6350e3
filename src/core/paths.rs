use std::path::{Path, PathBuf};

/// Default on-disk locations used when no explicit paths are given.
pub struct DataPaths {
    pub home: PathBuf,
    pub config: PathBuf,
    pub repo: PathBuf,
}

impl DataPaths {
    /// Resolve from `$PROMPTDEX_HOME`, falling back to `~/.prompts`.
    pub fn new() -> Self {
        let home = std::env::var_os("PROMPTDEX_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| expand_home(Path::new("~/.prompts")));
        Self::from_home(home)
    }

    pub fn from_home(home: PathBuf) -> Self {
        Self {
            config: home.join("config.yaml"),
            repo: home.join("repo"),
            home,
        }
    }

    /// Snapshot directory that sits next to the documents of `root`.
    pub fn index_dir_for(root: &Path) -> PathBuf {
        root.join(".prompts_index")
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
