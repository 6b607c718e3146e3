use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::time::Duration;

use anyhow::Context as _;
use rust_embed::RustEmbed;
use serde::Deserialize;

use crate::serdable::GlobPattern;
use crate::testing::{ExecutionMonitor, SamplerKind, VerdictEvaluator};

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[serde(skip)]
    pub source_config_file: Option<PathBuf>,
    pub build: BuildConfig,
    pub test: TestConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub compiler: PathBuf,
    pub flags: Vec<String>,
    pub sources: GlobPattern,
    pub executable: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestConfig {
    pub timeout_secs: u64,
    pub stress_timeout_secs: u64,
    pub stress_from: u32,
    pub poll_interval_ms: u64,
    pub sampler: SamplerKind,
    pub sampler_timeout_ms: u64,
    pub leak_threshold_mb: f64,
    pub stderr_capture_max_bytes: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            compiler: "g++".into(),
            flags: ["-std=c++14", "-DNDEBUG", "-Wall"]
                .map(String::from)
                .to_vec(),
            sources: GlobPattern::parse("*.cpp").expect("valid glob literal"),
            executable: None,
        }
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            stress_timeout_secs: 600,
            stress_from: 5,
            poll_interval_ms: ExecutionMonitor::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            sampler: SamplerKind::default(),
            sampler_timeout_ms: 2000,
            leak_threshold_mb: VerdictEvaluator::DEFAULT_LEAK_THRESHOLD_MB,
            stderr_capture_max_bytes: ExecutionMonitor::DEFAULT_STDERR_CAPTURE_MAX_BYTES,
        }
    }
}

/// Wall-clock budget per test. Ids from `stress_from` upward are stress tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub default_budget: Duration,
    pub stress_budget: Duration,
    pub stress_from: u32,
}

impl TimeoutPolicy {
    pub fn is_stress(&self, test_id: u32) -> bool {
        test_id >= self.stress_from
    }

    pub fn budget_for(&self, test_id: u32) -> Duration {
        if self.is_stress(test_id) {
            self.stress_budget
        } else {
            self.default_budget
        }
    }
}

impl TestConfig {
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            default_budget: Duration::from_secs(self.timeout_secs),
            stress_budget: Duration::from_secs(self.stress_timeout_secs),
            stress_from: self.stress_from,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sampler_timeout(&self) -> Duration {
        Duration::from_millis(self.sampler_timeout_ms)
    }

    pub fn monitor(&self) -> ExecutionMonitor {
        ExecutionMonitor::new(self.sampler.build(self.sampler_timeout()))
            .poll_interval(self.poll_interval())
            .stderr_capture_max_bytes(self.stderr_capture_max_bytes)
    }

    pub fn evaluator(&self) -> VerdictEvaluator {
        VerdictEvaluator::new(self.leak_threshold_mb)
    }
}

impl BuildConfig {
    pub fn executable_name(&self) -> String {
        self.executable
            .clone()
            .unwrap_or_else(|| format!("main{}", std::env::consts::EXE_SUFFIX))
    }
}

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

impl Config {
    pub const FILENAME: &str = "memjudge.toml";

    pub fn example_toml() -> String {
        let file = Asset::get(Self::FILENAME).expect("example config is embedded");
        String::from_utf8_lossy(file.data.as_ref()).into_owned()
    }

    pub fn from_toml(s: &str) -> StdResult<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_toml_file(filepath: PathBuf) -> anyhow::Result<Self> {
        let toml = fsutil::read_to_string(&filepath).context("Cannot read a file")?;
        let mut cfg = Self::from_toml(&toml)
            .with_context(|| format!("Invalid config TOML: {:?}", filepath))?;
        cfg.source_config_file = Some(filepath);
        Ok(cfg)
    }

    /// Find config file in ancestor dirs, including current dir.
    pub fn find_file_in_ancestors(cur_dir: impl AsRef<Path>) -> Option<PathBuf> {
        cur_dir
            .as_ref()
            .ancestors()
            .map(|dir| dir.join(Self::FILENAME))
            .find(|path| path.is_file())
    }

    /// Loads `explicit_file` if given, else the nearest `memjudge.toml` above `cur_dir`,
    /// else the defaults.
    pub fn load(explicit_file: Option<&Path>, cur_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let found = explicit_file
            .map(Path::to_path_buf)
            .or_else(|| Self::find_file_in_ancestors(cur_dir));
        match found {
            Some(path) => {
                log::debug!("Using config {}", path.to_string_lossy());
                Self::from_toml_file(path)
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn example_toml_should_be_parsable() {
        let toml = Config::example_toml();
        let cfg = dbg!(Config::from_toml(&toml)).unwrap();

        let Config {
            source_config_file,
            build,
            test,
        } = cfg;

        assert_eq!(source_config_file, None);
        assert_eq!(build.compiler, Path::new("g++"));
        assert_eq!(build.flags, vec!["-std=c++14", "-DNDEBUG", "-Wall"]);
        assert_eq!(build.sources, GlobPattern::parse("*.cpp").unwrap());
        assert_eq!(build.executable, None);

        assert_eq!(test, TestConfig::default());
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = Config::from_toml(
            r#"
            [test]
            timeout_secs = 3
            sampler = "none"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.test.timeout_secs, 3);
        assert_eq!(cfg.test.sampler, SamplerKind::Disabled);
        assert_eq!(cfg.test.stress_timeout_secs, 600);
        assert_eq!(cfg.build, BuildConfig::default());
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(Config::from_toml("[test]\ntimeout = 3\n").is_err());
    }

    #[test]
    fn timeout_policy_is_static_per_class() {
        let p = TestConfig::default().timeout_policy();
        assert_eq!(p.budget_for(1), Duration::from_secs(10));
        assert_eq!(p.budget_for(4), Duration::from_secs(10));
        assert_eq!(p.budget_for(5), Duration::from_secs(600));
        assert_eq!(p.budget_for(8), Duration::from_secs(600));
        assert!(!p.is_stress(4));
        assert!(p.is_stress(5));
    }

    #[test]
    fn load_finds_config_in_ancestors() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            tmp.path().join(Config::FILENAME),
            "[build]\ncompiler = \"clang++\"\n",
        )
        .unwrap();

        let cfg = Config::load(None, &nested).unwrap();
        assert_eq!(cfg.build.compiler, Path::new("clang++"));
        assert_eq!(
            cfg.source_config_file,
            Some(tmp.path().join(Config::FILENAME))
        );
    }

    #[test]
    fn default_executable_name_has_platform_suffix() {
        let b = BuildConfig::default();
        assert_eq!(
            b.executable_name(),
            format!("main{}", std::env::consts::EXE_SUFFIX)
        );
    }
}
