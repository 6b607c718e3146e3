use std::path::{Path, PathBuf};

use anyhow::Context as _;

pub fn current_dir() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("Failed to get current dir")
}

/// `$HOME/foo/memjudge.toml` is shown as `~/foo/memjudge.toml`.
pub fn display_path(path: &Path) -> String {
    let shortened = ::dirs::home_dir()
        .and_then(|home| path.strip_prefix(home).ok())
        .map(|rest| Path::new("~").join(rest));
    shortened
        .as_deref()
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_path_outside_home_is_unchanged() {
        assert_eq!(
            display_path(Path::new("/nonexistent/memjudge.toml")),
            "/nonexistent/memjudge.toml"
        );
    }

    #[test]
    fn display_path_under_home_uses_tilde() {
        let Some(home) = ::dirs::home_dir() else {
            return
        };
        let shown = display_path(&home.join("proj").join("memjudge.toml"));
        assert_eq!(shown, Path::new("~/proj/memjudge.toml").to_string_lossy());
    }
}
