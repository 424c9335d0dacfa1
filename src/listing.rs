//! Native directory enumeration for `ls` replies.
//!
//! Replaces shelling out to an external listing utility: entries come from
//! `read_dir` as a structured, sorted sequence; text rendering is kept
//! separate as the presentation step.

use std::fs;
use std::io;
use std::path::Path;

/// Names of the visible entries of `dir`, sorted. Hidden (dot-prefixed)
/// entries are skipped, which also keeps in-flight upload staging files
/// out of listings.
pub fn read_entries(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// One name per line, trailing newline unless the listing is empty.
pub fn render(names: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }
    let mut out = names.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn entries_are_sorted_and_hidden_files_skipped() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("zeta.txt")).unwrap();
        File::create(dir.path().join("alpha.txt")).unwrap();
        File::create(dir.path().join(".12345678")).unwrap();
        fs::create_dir(dir.path().join("mid")).unwrap();

        let names = read_entries(dir.path()).unwrap();
        assert_eq!(names, vec!["alpha.txt", "mid", "zeta.txt"]);
    }

    #[test]
    fn empty_directory_renders_empty() {
        let dir = TempDir::new().unwrap();
        let names = read_entries(dir.path()).unwrap();
        assert!(names.is_empty());
        assert_eq!(render(&names), "");
    }

    #[test]
    fn render_is_one_name_per_line() {
        let names = vec!["a".to_string(), "b".to_string()];
        assert_eq!(render(&names), "a\nb\n");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_entries(&dir.path().join("nope")).is_err());
    }
}
