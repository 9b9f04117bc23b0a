use std::path::{Path, PathBuf};

use common::error::AppError;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Case-sensitive suffix match against the allow-list, e.g. `.md` matches
/// `notes.md` but neither `notes.MD` nor `notes.markdown`.
pub fn matches_extension(file_name: &str, extensions: &[String]) -> bool {
    extensions
        .iter()
        .any(|ext| !ext.is_empty() && file_name.ends_with(ext.as_str()))
}

/// Absolute form of `root`; relative roots hang off the working directory.
pub fn absolute_root(root: &Path) -> Result<PathBuf, AppError> {
    if root.is_absolute() {
        Ok(root.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(root))
    }
}

/// Recursively collect regular files under `root` whose name carries an
/// allowed extension.
///
/// Entries are visited in file-name order so the same tree always yields the
/// same list. A missing root yields an empty list.
pub fn discover_files(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, AppError> {
    let root = absolute_root(root)?;
    if !root.exists() {
        warn!(root = %root.display(), "documents path does not exist; nothing to discover");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };

        // Follows symlinks, so linked documents count as regular files.
        if !entry.path().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if matches_extension(&name, extensions) {
            files.push(entry.into_path());
        } else {
            debug!(path = %entry.path().display(), "skipping file with unlisted extension");
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, b"content").expect("write file");
    }

    #[test]
    fn extension_match_is_exact_and_case_sensitive() {
        let allowed = exts(&[".md", ".txt"]);
        assert!(matches_extension("readme.md", &allowed));
        assert!(matches_extension("notes.txt", &allowed));
        assert!(!matches_extension("guide.markdown", &allowed));
        assert!(!matches_extension("README.MD", &allowed));
        assert!(!matches_extension("archive.md.gz", &allowed));
        assert!(!matches_extension("anything", &exts(&[""])));
    }

    #[test]
    fn discovers_only_allowed_files_recursively() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path();
        touch(root, "b.md");
        touch(root, "a.txt");
        touch(root, "guide.markdown");
        touch(root, "image.png");
        touch(root, "nested/deeper/page.html");
        touch(root, "nested/skip.pdf");

        let found = discover_files(root, &exts(&[".md", ".txt", ".html"])).expect("discover");

        let expected: Vec<PathBuf> = ["a.txt", "b.md", "nested/deeper/page.html"]
            .iter()
            .map(|relative| root.join(relative))
            .collect();
        assert_eq!(found, expected);
        assert!(found.iter().all(|path| path.is_absolute()));
    }

    #[test]
    fn discovery_order_is_stable() {
        let dir = tempdir().expect("tempdir");
        for name in ["z.md", "m.md", "a.md", "sub/c.md", "sub/b.md"] {
            touch(dir.path(), name);
        }
        let allowed = exts(&[".md"]);

        let first = discover_files(dir.path(), &allowed).expect("first walk");
        let second = discover_files(dir.path(), &allowed).expect("second walk");
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn empty_or_missing_root_yields_nothing() {
        let dir = tempdir().expect("tempdir");
        let allowed = exts(&[".md"]);

        assert!(discover_files(dir.path(), &allowed)
            .expect("empty dir")
            .is_empty());
        assert!(discover_files(&dir.path().join("absent"), &allowed)
            .expect("missing dir")
            .is_empty());
    }

    #[test]
    fn directories_named_like_documents_are_ignored() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("chapter.md")).expect("create dir");
        touch(dir.path(), "chapter.md/intro.md");

        let found = discover_files(dir.path(), &exts(&[".md"])).expect("discover");
        assert_eq!(found, vec![dir.path().join("chapter.md/intro.md")]);
    }
}
