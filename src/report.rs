use std::io::{self, Write};
use std::path::Path;

use crate::models::FileOutcome;

/// Outcomes that matched, in input order
pub fn matches(outcomes: &[FileOutcome]) -> impl Iterator<Item = &FileOutcome> {
    outcomes.iter().filter(|outcome| outcome.is_match())
}

/// Paths of the outcomes that matched, in input order
pub fn matched_paths(outcomes: &[FileOutcome]) -> Vec<&Path> {
    matches(outcomes).map(|outcome| outcome.path.as_path()).collect()
}

/// Print one matching path per line. With `details`, the detection count and
/// regions follow each path.
pub fn write_matches<W: Write>(out: &mut W, outcomes: &[FileOutcome], details: bool) -> io::Result<()> {
    for outcome in matches(outcomes) {
        if details {
            writeln!(
                out,
                "{} {} {}",
                outcome.path.display(),
                outcome.detections.len(),
                outcome.regions()
            )?;
        } else {
            writeln!(out, "{}", outcome.path.display())?;
        }
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Detection, Rect};
    use std::path::PathBuf;

    fn outcome(name: &str, hits: usize) -> FileOutcome {
        FileOutcome {
            path: PathBuf::from(name),
            detections: (0..hits)
                .map(|i| Detection {
                    rect: Rect::from_xywh(i as i32 * 10, 0, 5, 5),
                    score: 1.0,
                })
                .collect(),
            link: None,
        }
    }

    #[test]
    fn keeps_only_matches_in_order() {
        let outcomes = vec![outcome("a.jpg", 1), outcome("b.jpg", 0), outcome("c.jpg", 2)];
        let paths = matched_paths(&outcomes);
        assert_eq!(paths, vec![Path::new("a.jpg"), Path::new("c.jpg")]);
    }

    #[test]
    fn prints_paths_one_per_line() {
        let outcomes = vec![outcome("a.jpg", 1), outcome("b.jpg", 0)];
        let mut out = Vec::new();
        write_matches(&mut out, &outcomes, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a.jpg\n");
    }

    #[test]
    fn details_include_count_and_regions() {
        let outcomes = vec![outcome("c.jpg", 2)];
        let mut out = Vec::new();
        write_matches(&mut out, &outcomes, true).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "c.jpg 2 [(0, 0) (4, 4)] [(10, 0) (14, 4)]\n"
        );
    }
}
