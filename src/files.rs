use std::path::PathBuf;
use tracing::{debug, warn};

/// Expand shell-style glob patterns into a flat list of paths.
///
/// Matches are returned pattern by pattern, in the order the patterns were
/// given. Nothing is deduplicated, so a file matched by two patterns appears
/// twice. Patterns that match nothing contribute nothing.
pub fn expand_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for pattern in patterns {
        let pattern = pattern.as_ref();
        if pattern.is_empty() {
            continue;
        }

        let entries = match glob::glob(pattern) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring invalid pattern {:?}: {}", pattern, e);
                continue;
            }
        };

        for entry in entries {
            match entry {
                Ok(path) => files.push(path),
                Err(e) => debug!("Skipping unreadable entry for {:?}: {}", pattern, e),
            }
        }
    }

    files
}
