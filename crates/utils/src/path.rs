use std::path::PathBuf;

/// Expand a leading `~` (and `$VAR` references) in a user supplied path.
/// Falls back to the raw input when expansion fails.
pub fn expand_tilde(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}
