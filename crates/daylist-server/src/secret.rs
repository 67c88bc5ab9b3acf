//! Secret reference resolver.
//!
//! Credential values in `config.toml` may point outside the file:
//!
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - `file::/run/secrets/name` reads the first line of the file
//! - anything else is used as-is

use std::path::Path;

/// Resolves a value that may contain a secret reference prefix.
pub fn resolve(value: &str) -> Result<String, String> {
    if let Some(var) = value.strip_prefix("env::") {
        std::env::var(var).map_err(|_| format!("environment variable `{var}` is not set"))
    } else if let Some(path) = value.strip_prefix("file::") {
        resolve_file(Path::new(path))
    } else {
        Ok(value.to_string())
    }
}

fn resolve_file(path: &Path) -> Result<String, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read secret file {}: {e}", path.display()))?;
    content
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| format!("secret file {} is empty", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_text_passthrough() {
        assert_eq!(resolve("hello").unwrap(), "hello");
        assert_eq!(resolve("").unwrap(), "");
    }

    #[test]
    fn env_prefix_resolves() {
        unsafe {
            std::env::set_var("_DAYLIST_TEST_SECRET", "from-env");
        }
        assert_eq!(resolve("env::_DAYLIST_TEST_SECRET").unwrap(), "from-env");
        unsafe {
            std::env::remove_var("_DAYLIST_TEST_SECRET");
        }
    }

    #[test]
    fn env_prefix_missing_var_errors() {
        let err = resolve("env::_DAYLIST_NONEXISTENT_VAR_12345").unwrap_err();
        assert!(err.contains("not set"));
    }

    #[test]
    fn file_prefix_reads_first_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "file-secret").unwrap();
        writeln!(file, "ignored").unwrap();

        let value = resolve(&format!("file::{}", file.path().display())).unwrap();
        assert_eq!(value, "file-secret");
    }

    #[test]
    fn file_prefix_empty_file_errors() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(resolve(&format!("file::{}", file.path().display())).is_err());
    }
}
