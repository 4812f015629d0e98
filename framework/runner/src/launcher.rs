use std::path::{Path, PathBuf};

use anyhow::bail;
use anyhow::Context;

/// Resolve the program used to run a command.
///
/// A bare name such as `node` is looked up in the user's `PATH`. Anything that contains a path
/// separator is used as given, and must exist.
pub fn resolve_program(program: &str) -> anyhow::Result<PathBuf> {
    resolve_program_with(program, |name| which::which(name))
}

/// Like [resolve_program], but looks up bare names in the given search path instead of `PATH`.
pub fn resolve_program_in(program: &str, search_path: &Path) -> anyhow::Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get the current directory")?;
    resolve_program_with(program, |name| {
        which::which_in(name, Some(search_path), &cwd)
    })
}

fn resolve_program_with(
    program: &str,
    lookup: impl FnOnce(&str) -> which::Result<PathBuf>,
) -> anyhow::Result<PathBuf> {
    if program.is_empty() {
        bail!("Program to run is set to an empty string");
    }

    let path = Path::new(program);
    if path.components().count() > 1 || path.is_absolute() {
        if !path.exists() {
            bail!(
                "Program '{}' is a path but that path doesn't exist",
                path.display()
            );
        }
        return Ok(path.to_path_buf());
    }

    log::debug!("'{program}' is not a path so looking in user's 'PATH'");
    lookup(program).with_context(|| {
        format!("'{program}' not found in PATH. Please install it or configure the full path.")
    })
}

#[cfg(test)]
mod tests {
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt as _;

    use tempfile::{NamedTempFile, TempDir};

    use super::*;

    #[test]
    fn test_should_not_resolve_path_if_not_exist() {
        let result = resolve_program("/non/existent/path/to/node");
        assert!(result.is_err());
    }

    #[test]
    fn test_should_resolve_existing_path() {
        let temp = NamedTempFile::new().expect("failed to create temp file");
        let test_path = temp.path().to_str().expect("failed to get temp file path");
        let result = resolve_program(test_path).expect("failed to resolve program");
        assert_eq!(result, PathBuf::from(test_path));
    }

    #[test]
    fn test_should_not_resolve_empty_program() {
        assert!(resolve_program("").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_should_resolve_program_in_search_path() {
        let temp = TempDir::new().expect("failed to create temp dir");
        // create node file in temp dir
        let node_file_path = temp.path().join("node");
        std::fs::write(&node_file_path, "hello").expect("failed to create node file");
        let mut perms = std::fs::metadata(&node_file_path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&node_file_path, perms).unwrap();

        let result = resolve_program_in("node", temp.path()).expect("failed to resolve program");
        assert_eq!(result, node_file_path);
    }

    #[test]
    fn test_should_not_resolve_missing_program_in_search_path() {
        let temp = TempDir::new().expect("failed to create temp dir");

        let result = resolve_program_in("node", temp.path());
        assert!(result.is_err());
    }
}
