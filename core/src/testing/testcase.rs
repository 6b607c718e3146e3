use std::path::{Path, PathBuf};

use lazy_regex::regex_captures;

/// Files belonging to test `N` under a tests dir:
/// `testN.in`, `testN.out` and the result file `testN.res`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestcaseFiles {
    pub id: u32,
    pub input: PathBuf,
    pub expected: PathBuf,
    pub result: PathBuf,
}

impl TestcaseFiles {
    pub const INPUT_EXT: &str = "in";
    pub const EXPECTED_EXT: &str = "out";
    pub const RESULT_EXT: &str = "res";

    pub fn locate(tests_dir: impl AsRef<Path>, id: u32) -> Self {
        let dir = tests_dir.as_ref();
        let file = |ext: &str| dir.join(format!("test{}.{}", id, ext));
        Self {
            id,
            input: file(Self::INPUT_EXT),
            expected: file(Self::EXPECTED_EXT),
            result: file(Self::RESULT_EXT),
        }
    }

    pub fn has_input(&self) -> bool {
        self.input.is_file()
    }

    pub fn has_expected(&self) -> bool {
        self.expected.is_file()
    }

    /// `"test12.in"` => `Some(12)`
    pub fn parse_input_filename(filename: &str) -> Option<u32> {
        let (_, id) = regex_captures!(r"^test(\d+)\.in$", filename)?;
        id.parse().ok()
    }

    /// Test ids of every `test<N>.in` under `dir`, in numerical order.
    pub fn enumerate_ids(dir: impl AsRef<Path>) -> fsutil::Result<Vec<u32>> {
        let mut ids = Vec::new();
        for entry in fsutil::read_dir(&dir)?.filter_map(Result::ok) {
            let Ok(ft) = entry.file_type() else {
                continue
            };
            if ft.is_dir() {
                continue;
            }
            if let Some(id) = Self::parse_input_filename(&entry.file_name().to_string_lossy()) {
                ids.push(id)
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}
