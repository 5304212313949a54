//! Path helpers shared by config and the walker.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Make `path` absolute so every indexed path is reported in full.
///
/// Existing paths are canonicalized (symlinks in the root resolved). Paths that
/// do not exist are joined onto the working directory and cleaned up
/// syntactically, so error messages still name an absolute location.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    std::fs::canonicalize(&absolute).unwrap_or_else(|_| clean_components(&absolute))
}

fn clean_components(path: &Path) -> PathBuf {
    let mut kept: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(kept.last(), Some(Component::Normal(_))) {
                    kept.pop();
                }
            }
            other => kept.push(other),
        }
    }
    kept.into_iter().collect()
}

/// `$HOME`, or `/tmp` with a warning when it is unset.
pub fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[FIDX-CONFIG] WARNING: HOME not set, falling back to /tmp");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_becomes_absolute() {
        let resolved = resolve_absolute_path(Path::new("."));
        assert!(resolved.is_absolute());
        assert_eq!(
            resolved,
            std::fs::canonicalize(env::current_dir().unwrap()).unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn missing_path_is_cleaned_syntactically() {
        let input = Path::new("/fidx-missing/one/../two/./three");
        assert!(std::fs::canonicalize(input).is_err());
        assert_eq!(
            resolve_absolute_path(input),
            Path::new("/fidx-missing/two/three")
        );
    }

    #[cfg(unix)]
    #[test]
    fn parent_of_root_stays_at_root() {
        assert_eq!(clean_components(Path::new("/../x")), Path::new("/x"));
    }
}
