use std::path::{Path, PathBuf};

use reviewq_core::config::DEFAULT_CONFIG_FILE;

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` flag / `REVIEWQ_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `reviewq.yaml`
/// 3. Fall back to `cwd/reviewq.yaml`
pub fn resolve_config(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd).unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_FILE))
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(DEFAULT_CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_path_wins() {
        let p = Path::new("/tmp/elsewhere.yaml");
        assert_eq!(resolve_config(Some(p)), p);
    }

    #[test]
    fn finds_config_in_parent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(
            find_upward(&nested),
            Some(dir.path().join(DEFAULT_CONFIG_FILE))
        );
    }
}
