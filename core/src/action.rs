pub mod error {
    #[allow(unused_imports)]
    pub(crate) use anyhow::{anyhow, bail, ensure, Context as _};
    pub use anyhow::{Error, Result};
}
use std::path::{Path, PathBuf};
use std::time::Duration;

use error::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::build::BuildCommand;
use crate::config::{BuildConfig, TestConfig};
use crate::style;
use crate::testing::{
    ExecError, Executable, ExecutionMonitor, MonitorObserver, ShutdownSignals, TestReport,
    TestcaseFiles, Verdict, VerdictEvaluator,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SuiteOptions {
    pub abort_on_fail: bool,
    /// Print expected/actual output and stderr of failed tests.
    pub show_detail: bool,
}

#[derive(Debug, Default)]
pub struct SuiteSummary {
    pub reports: Vec<TestReport>,
    pub setup_failures: Vec<(u32, Error)>,
    pub aborted: bool,
}

impl SuiteSummary {
    pub fn num_passed(&self) -> usize {
        self.reports.iter().filter(|r| r.verdict.is_passed()).count()
    }

    pub fn num_failed(&self) -> usize {
        self.reports.len() + self.setup_failures.len() - self.num_passed()
    }

    pub fn all_passed(&self) -> bool {
        self.num_failed() == 0
    }
}

/// Compiles every source in `code_dir` into `code_dir/<executable>`.
/// Returns the absolute path of the executable.
pub async fn build_program(code_dir: impl AsRef<Path>, cfg: &BuildConfig) -> Result<PathBuf> {
    let code_dir = code_dir.as_ref();
    let sources = BuildCommand::find_sources(code_dir, &cfg.sources)?;
    let output = code_dir.join(cfg.executable_name());

    log::info!(
        "Compiling {} source file(s) in {}",
        sources.len(),
        code_dir.to_string_lossy()
    );
    BuildCommand::from_config(cfg)
        .compile(&sources, &output)
        .await?;

    fsutil::canonicalize_path(&output).context("Compiler did not produce the executable")
}

/// Removes every `*.res` file in `tests_dir`.
pub fn clean_results(tests_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let pattern = ::glob::Pattern::new(&format!("*.{}", TestcaseFiles::RESULT_EXT))?;
    fsutil::remove_files_matching(&tests_dir, &pattern).context("Failed to clean result files")
}

/// The explicitly requested ids in the given order, or else every `test<N>.in` in `tests_dir`.
pub fn resolve_test_ids(tests_dir: impl AsRef<Path>, explicit: Option<&[u32]>) -> Result<Vec<u32>> {
    if let Some(ids) = explicit {
        return Ok(ids.to_vec());
    }
    TestcaseFiles::enumerate_ids(&tests_dir).context("Failed to find testcases")
}

/// Runs one test: precheck, execute under the monitor, then evaluate.
/// `Err` means the test could not be run at all (e.g. the executable failed to launch),
/// or that a shutdown signal arrived while it was running.
pub async fn run_testcase(
    monitor: &ExecutionMonitor,
    evaluator: &VerdictEvaluator,
    exe: &Executable,
    files: &TestcaseFiles,
    budget: Duration,
    observer: &dyn MonitorObserver,
    signals: &mut ShutdownSignals,
) -> Result<TestReport> {
    if let Some(verdict) = VerdictEvaluator::precheck(files) {
        return Ok(TestReport::not_launched(files.id, verdict, budget));
    }

    let input = fsutil::open_file(&files.input)?;
    let result = fsutil::create_file(&files.result)?;

    let outcome = monitor
        .run_until(exe, input, result, budget, observer, signals.recv())
        .await
        .with_context(|| format!("Failed to run test {}", files.id))?;

    let actual = fsutil::read_to_string_lossy(&files.result)?;
    let expected = fsutil::read_to_string_lossy(&files.expected)?;

    Ok(evaluator.evaluate(outcome, actual, expected, files.id, budget))
}

struct SpinnerObserver<'a> {
    bar: &'a ProgressBar,
    test_id: u32,
}

impl MonitorObserver for SpinnerObserver<'_> {
    fn on_poll(&self, elapsed: Duration, _sample_mb: Option<f64>, peak_mb: f64) {
        self.bar.set_message(format!(
            "Test {} ... {:.1}s, peak {:.1} MB",
            self.test_id,
            elapsed.as_secs_f64(),
            peak_mb
        ));
        self.bar.tick();
    }
}

fn is_interrupted(e: &Error) -> bool {
    matches!(e.downcast_ref::<ExecError>(), Some(ExecError::Interrupted(_)))
}

/// Runs the given tests one after another and prints a line per test plus a summary.
///
/// Ctrl-C and SIGTERM are caught for the whole run: the running test's process group is
/// killed and the run stops with an error.
pub async fn do_test(
    exe: &Executable,
    tests_dir: impl AsRef<Path>,
    test_ids: &[u32],
    cfg: &TestConfig,
    opts: SuiteOptions,
) -> Result<SuiteSummary> {
    let tests_dir = tests_dir.as_ref();
    let monitor = cfg.monitor();
    let evaluator = cfg.evaluator();
    let policy = cfg.timeout_policy();

    log::info!("Running: {}", exe);
    log::info!(
        "Sampling memory with '{}' every {:?}",
        monitor.get_sampler().name(),
        monitor.get_poll_interval()
    );

    let style = ProgressStyle::default_spinner()
        .template("{spinner} {msg}")
        .context("Invalid progress bar template")?;

    let mut signals = ShutdownSignals::listen().context("Failed to install signal handlers")?;
    let mut summary = SuiteSummary::default();

    for &id in test_ids {
        let files = TestcaseFiles::locate(tests_dir, id);
        let budget = policy.budget_for(id);

        let bar = ProgressBar::new_spinner()
            .with_style(style.clone())
            .with_message(format!("Test {} ...", id));
        let observer = SpinnerObserver {
            bar: &bar,
            test_id: id,
        };

        let res = self::run_testcase(
            &monitor,
            &evaluator,
            exe,
            &files,
            budget,
            &observer,
            &mut signals,
        )
        .await;
        bar.finish_and_clear();

        let failed = match res {
            Ok(report) => {
                style::print_report(&report, policy.is_stress(id));
                let is_judged_failure =
                    matches!(report.verdict, Verdict::WrongOutput | Verdict::RuntimeError);
                if opts.show_detail && is_judged_failure {
                    style::print_test_result_detail(&report);
                }
                let failed = !report.verdict.is_passed();
                summary.reports.push(report);
                failed
            }
            Err(e) if self::is_interrupted(&e) => {
                return Err(e.context(format!("Stopped during test {}", id)));
            }
            Err(e) => {
                style::print_setup_failure(id, &e);
                summary.setup_failures.push((id, e));
                true
            }
        };

        if failed && opts.abort_on_fail {
            log::info!("Aborting after the first failure (test {})", id);
            summary.aborted = true;
            break;
        }
    }

    println!();
    style::print_test_result_summary(&summary.reports, summary.setup_failures.len());
    Ok(summary)
}
