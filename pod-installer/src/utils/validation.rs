// Input validation utilities

use std::path::Path;

/// Lowest accepted web configurator port.
pub const MIN_WEB_PORT: i64 = 1000;
/// Highest accepted web configurator port.
///
/// NOTE: 65353, not 65535. This is the range the installer has always accepted.
pub const MAX_WEB_PORT: i64 = 65353;

/// True iff `port` parses as a base-10 integer within `[MIN_WEB_PORT, MAX_WEB_PORT]`.
pub fn validate_web_port(port: &str) -> bool {
    match port.parse::<i64>() {
        Ok(p) => (MIN_WEB_PORT..=MAX_WEB_PORT).contains(&p),
        Err(_) => false,
    }
}

/// True iff the parent of `dir` exists and is a directory. `dir` itself need not exist.
pub fn validate_install_directory(dir: &str) -> bool {
    let trimmed = dir.trim();
    if trimmed.is_empty() {
        return false;
    }
    match Path::new(trimmed).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_port_accepts_range_bounds() {
        assert!(validate_web_port("8080"));
        assert!(validate_web_port("1000"));
        assert!(validate_web_port("65353"));
    }

    #[test]
    fn web_port_rejects_out_of_range_and_garbage() {
        assert!(!validate_web_port("999"));
        assert!(!validate_web_port("abc"));
        assert!(!validate_web_port("99999"));
        assert!(!validate_web_port("65354"));
        assert!(!validate_web_port("65535"));
        assert!(!validate_web_port(""));
        assert!(!validate_web_port(" 8080"));
        assert!(!validate_web_port("80.5"));
    }

    #[test]
    fn install_directory_with_existing_parent_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("wire-pod");
        assert!(validate_install_directory(candidate.to_str().unwrap()));
    }

    #[test]
    fn install_directory_with_missing_parent_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("missing").join("wire-pod");
        assert!(!validate_install_directory(candidate.to_str().unwrap()));
    }

    #[test]
    fn install_directory_whose_parent_is_a_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        let candidate = file.join("wire-pod");
        assert!(!validate_install_directory(candidate.to_str().unwrap()));
    }

    #[test]
    fn install_directory_without_parent_is_invalid() {
        assert!(!validate_install_directory(""));
        assert!(!validate_install_directory("wire-pod"));
    }
}
