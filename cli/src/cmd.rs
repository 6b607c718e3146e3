use std::path::PathBuf;

use anyhow::Context as _;
use memjudge_core::{
    action::{self, SuiteOptions},
    print_success,
    testing::{Executable, SamplerKind},
    Config,
};

use crate::config;

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding testN.in / testN.out
    #[arg(long, alias("tests_dir"), default_value = "./tests/")]
    pub tests_dir: PathBuf,

    /// Directory holding the sources to compile
    #[arg(long, alias("code_dir"), default_value = "./")]
    pub code_dir: PathBuf,

    #[arg(long, alias("compiler_path"))]
    pub compiler_path: Option<PathBuf>,

    /// Remove testN.res files and exit
    #[arg(long)]
    pub clean: bool,

    /// Stop at the first test that does not pass
    #[arg(long, alias("abort_on_fail"))]
    pub abort_on_fail: bool,

    /// Test ids to run (default: every testN.in in the tests dir)
    #[arg(short = 't', long = "tests", num_args = 0..)]
    pub tests: Option<Vec<u32>>,

    /// Config file (default: nearest memjudge.toml in the current dir or its ancestors)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub stress_timeout: Option<u64>,

    /// Smallest test id treated as a stress test
    #[arg(long, value_name = "ID")]
    pub stress_from: Option<u32>,

    #[arg(long, value_name = "MB")]
    pub leak_threshold: Option<f64>,

    #[arg(long, value_name = "MS")]
    pub poll_interval: Option<u64>,

    #[arg(long, value_enum)]
    pub sampler: Option<ArgSampler>,

    /// Show expected output, actual output and stderr of failed tests
    #[arg(long)]
    pub detail: bool,

    #[arg(long)]
    pub print_example_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ArgSampler {
    Auto,
    Procfs,
    Ps,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "none")]
    Disabled,
}

impl From<ArgSampler> for SamplerKind {
    fn from(value: ArgSampler) -> Self {
        use ArgSampler::*;
        match value {
            Auto => SamplerKind::Auto,
            Procfs => SamplerKind::Procfs,
            Ps => SamplerKind::Ps,
            PowerShell => SamplerKind::PowerShell,
            Disabled => SamplerKind::Disabled,
        }
    }
}

pub type CmdResult = anyhow::Result<()>;

impl Args {
    pub async fn exec(&self) -> CmdResult {
        if self.print_example_config {
            print!("{}", Config::example_toml());
            return Ok(());
        }

        let cfg = config::load_with_args(self)?;

        if self.clean {
            let removed = action::clean_results(&self.tests_dir)?;
            print_success!(
                "Removed {} result file(s) in {}",
                removed.len(),
                self.tests_dir.to_string_lossy()
            );
            return Ok(());
        }

        let exe_path = action::build_program(&self.code_dir, &cfg.build)
            .await
            .context("Build failed")?;

        let test_ids = action::resolve_test_ids(&self.tests_dir, self.tests.as_deref())?;

        let opts = SuiteOptions {
            abort_on_fail: self.abort_on_fail,
            show_detail: self.detail,
        };
        let _ = action::do_test(
            &Executable::new(exe_path),
            &self.tests_dir,
            &test_ids,
            &cfg.test,
            opts,
        )
        .await?;
        Ok(())
    }
}
