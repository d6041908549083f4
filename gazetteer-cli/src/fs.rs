//! Capability-based file access for the CLI's source and store paths.

use std::io;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8};

/// Open `path` for reading using ambient authority.
pub(crate) fn open_utf8_file(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Open the directory holding `path` and return it with the bare file name.
pub(crate) fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("path should include a file name"))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Whether `path` names an existing regular file.
pub(crate) fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = open_dir_and_file(path)?;
    dir.metadata(name.as_str()).map(|meta| meta.is_file())
}

/// Whether the directory that would hold `path` exists.
pub(crate) fn parent_dir_exists(path: &Utf8Path) -> bool {
    open_dir_and_file(path).is_ok()
}

/// Read `path` to a string.
pub(crate) fn read_to_string(path: &Utf8Path) -> io::Result<String> {
    let (dir, name) = open_dir_and_file(path)?;
    dir.read_to_string(name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf-8 workspace");
        (tmp, root)
    }

    #[rstest]
    fn regular_files_are_recognised() {
        let (_tmp, root) = workspace();
        let path = root.join("stops.xml");
        std::fs::write(&path, b"<NaPTAN/>").expect("write file");
        assert!(file_is_file(&path).expect("inspect file"));
        assert!(!file_is_file(&root).expect("inspect directory"));
        assert_eq!(read_to_string(&path).expect("read file"), "<NaPTAN/>");
    }

    #[rstest]
    fn missing_files_report_not_found() {
        let (_tmp, root) = workspace();
        let err = file_is_file(&root.join("absent.xml")).expect_err("file is absent");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[rstest]
    fn parent_directories_are_checked() {
        let (_tmp, root) = workspace();
        assert!(parent_dir_exists(&root.join("descendants.db")));
        assert!(!parent_dir_exists(&root.join("missing").join("descendants.db")));
    }
}
