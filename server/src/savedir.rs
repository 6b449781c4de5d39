use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Directory used when no configured target is usable.
pub const FALLBACK_DIR: &str = "captured_images";

/// Pick the startup save directory: the configured target when it
/// already exists, otherwise `captured_images/` under `base`, created
/// on demand.
pub fn resolve(configured: Option<&str>, base: &Path) -> std::io::Result<PathBuf> {
    if let Some(target) = configured {
        let target = PathBuf::from(target);
        if target.is_dir() {
            info!(path = %target.display(), "using configured save directory");
            return Ok(target);
        }
        warn!(
            path = %target.display(),
            "configured save directory missing, falling back"
        );
    }

    let fallback = base.join(FALLBACK_DIR);
    std::fs::create_dir_all(&fallback)?;
    info!(path = %fallback.display(), "using fallback save directory");
    Ok(fallback)
}

/// Validate a runtime directory change: create it if missing, reject
/// anything that is not a directory afterwards.
pub fn prepare(path: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(path)?;
    if !path.is_dir() {
        return Err(std::io::Error::other(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_base(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cam-station-test-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn existing_configured_dir_wins() {
        let base = temp_base("configured");
        let target = base.join("target");
        std::fs::create_dir_all(&target).unwrap();

        let picked = resolve(Some(target.to_str().unwrap()), &base).unwrap();
        assert_eq!(picked, target);
    }

    #[test]
    fn missing_configured_dir_falls_back() {
        let base = temp_base("missing");
        let target = base.join("does-not-exist");

        let picked = resolve(Some(target.to_str().unwrap()), &base).unwrap();
        assert_eq!(picked, base.join(FALLBACK_DIR));
        assert!(picked.is_dir());
    }

    #[test]
    fn no_configured_dir_uses_fallback() {
        let base = temp_base("none");
        let picked = resolve(None, &base).unwrap();
        assert_eq!(picked, base.join(FALLBACK_DIR));
        assert!(picked.is_dir());
    }

    #[test]
    fn prepare_creates_directory() {
        let base = temp_base("prepare");
        let dir = base.join("new").join("nested");
        let prepared = prepare(&dir).unwrap();
        assert!(prepared.is_dir());
    }

    #[test]
    fn prepare_rejects_file() {
        let base = temp_base("reject");
        let file = base.join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(prepare(&file).is_err());
    }
}
