use std::{
    fs::{self, File, ReadDir},
    path::{Path, PathBuf},
};

pub mod error {
    use std::{io, path::PathBuf};

    pub type Result<T> = std::result::Result<T, self::Error>;

    type Msg = &'static str;

    #[derive(Debug, thiserror::Error)]
    pub enum Error {
        #[error("{0} ({1}): {2}")]
        SingleIO(Msg, PathBuf, #[source] io::Error),

        #[error("Failed to canonicalize path '{0}': {1}")]
        CanonicalizePath(PathBuf, #[source] io::Error),
    }
}
pub use error::{Error, Result};

#[must_use]
pub fn read_to_string(filepath: impl AsRef<Path>) -> Result<String> {
    fs::read_to_string(&filepath)
        .map_err(|e| Error::SingleIO("Cannot read file", filepath.as_ref().to_owned(), e))
}

/// Reads a file whose contents were produced by an arbitrary program.
/// Invalid UTF-8 sequences are replaced instead of failing the read.
#[must_use]
pub fn read_to_string_lossy(filepath: impl AsRef<Path>) -> Result<String> {
    let bytes = fs::read(&filepath)
        .map_err(|e| Error::SingleIO("Cannot read file", filepath.as_ref().to_owned(), e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[must_use]
pub fn open_file(filepath: impl AsRef<Path>) -> Result<File> {
    File::open(&filepath)
        .map_err(|e| Error::SingleIO("Cannot open file", filepath.as_ref().to_owned(), e))
}

/// Creates the file, truncating it if it already exists.
#[must_use]
pub fn create_file(filepath: impl AsRef<Path>) -> Result<File> {
    File::create(&filepath)
        .map_err(|e| Error::SingleIO("Cannot create file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn remove_file(filepath: impl AsRef<Path>) -> Result<()> {
    fs::remove_file(&filepath)
        .map_err(|e| Error::SingleIO("Cannot remove file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn read_dir(dir: impl AsRef<Path>) -> Result<ReadDir> {
    fs::read_dir(&dir).map_err(|e| Error::SingleIO("Cannot read dir", dir.as_ref().to_owned(), e))
}

pub fn canonicalize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    path.canonicalize()
        .map_err(|e| Error::CanonicalizePath(path.to_owned(), e))
}

/// Lists regular files directly under `dir` whose file name matches `filename_pattern`,
/// sorted by path. Sub directories are not descended into.
pub fn find_files_matching(
    dir: impl AsRef<Path>,
    filename_pattern: &::glob::Pattern,
) -> Result<Vec<PathBuf>> {
    let mut res = Vec::new();
    for entry in self::read_dir(&dir)?.filter_map(std::result::Result::ok) {
        let Ok(file_type) = entry.file_type() else {
            continue
        };
        if file_type.is_dir() {
            continue;
        }
        let filename = entry.file_name();
        if filename_pattern.matches(filename.to_string_lossy().as_ref()) {
            res.push(entry.path());
        }
    }
    res.sort();
    Ok(res)
}

/// Removes every file directly under `dir` matching `filename_pattern`.
/// Returns the removed paths.
pub fn remove_files_matching(
    dir: impl AsRef<Path>,
    filename_pattern: &::glob::Pattern,
) -> Result<Vec<PathBuf>> {
    let files = self::find_files_matching(dir, filename_pattern)?;
    for f in &files {
        log::debug!("Removing {}", f.to_string_lossy());
        self::remove_file(f)?;
    }
    Ok(files)
}

#[cfg(test)]
mod test {
    use super::*;
    use glob::Pattern;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), name).unwrap();
    }

    #[test]
    fn find_files_matching_ignores_dirs_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "b.cpp");
        touch(tmp.path(), "a.cpp");
        touch(tmp.path(), "a.h");
        fs::create_dir(tmp.path().join("sub.cpp")).unwrap();

        let found = find_files_matching(tmp.path(), &Pattern::new("*.cpp").unwrap()).unwrap();
        assert_eq!(
            found,
            vec![tmp.path().join("a.cpp"), tmp.path().join("b.cpp")]
        );
    }

    #[test]
    fn remove_files_matching_keeps_others() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "test1.res");
        touch(tmp.path(), "test2.res");
        touch(tmp.path(), "test1.in");

        let removed =
            remove_files_matching(tmp.path(), &Pattern::new("*.res").unwrap()).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!tmp.path().join("test1.res").exists());
        assert!(tmp.path().join("test1.in").exists());
    }

    #[test]
    fn read_dir_reports_path_on_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let err = read_dir(&missing).unwrap_err();
        assert!(err.to_string().contains("nope"), "{}", err);
    }

    #[test]
    fn read_to_string_lossy_accepts_invalid_utf8() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out");
        fs::write(&path, b"ok\xff\n").unwrap();
        assert_eq!(read_to_string_lossy(&path).unwrap(), "ok\u{fffd}\n");
    }
}
