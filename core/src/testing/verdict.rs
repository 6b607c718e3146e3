use std::time::Duration;

use super::{
    result::{ExecutionOutcome, MemoryLeakWarning, TestReport, Verdict},
    testcase::TestcaseFiles,
};

/// Turns an [`ExecutionOutcome`] and the produced output into a [`TestReport`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerdictEvaluator {
    leak_threshold_mb: f64,
}

impl Default for VerdictEvaluator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LEAK_THRESHOLD_MB)
    }
}

impl VerdictEvaluator {
    pub const DEFAULT_LEAK_THRESHOLD_MB: f64 = 50.0;

    pub fn new(leak_threshold_mb: f64) -> Self {
        Self { leak_threshold_mb }
    }

    pub fn leak_threshold_mb(&self) -> f64 {
        self.leak_threshold_mb
    }

    /// Rejects a test whose input or expected output does not exist, before anything is run.
    pub fn precheck(files: &TestcaseFiles) -> Option<Verdict> {
        if !files.has_input() {
            Some(Verdict::InputMissing)
        } else if !files.has_expected() {
            Some(Verdict::ExpectedOutputMissing)
        } else {
            None
        }
    }

    pub fn evaluate(
        &self,
        outcome: ExecutionOutcome,
        actual: impl Into<String>,
        expected: impl Into<String>,
        test_id: u32,
        budget: Duration,
    ) -> TestReport {
        let actual = actual.into();
        let expected = expected.into();
        let verdict = Self::classify(&outcome, &actual, &expected);
        let leak = self.detect_leak(&outcome);
        TestReport {
            test_id,
            verdict,
            leak,
            outcome: Some(outcome),
            actual,
            expected,
            budget,
        }
    }

    pub fn classify(outcome: &ExecutionOutcome, actual: &str, expected: &str) -> Verdict {
        if outcome.timed_out {
            Verdict::Timeout
        } else if !outcome.is_success() {
            Verdict::RuntimeError
        } else if actual.trim() == expected.trim() {
            Verdict::Passed
        } else {
            Verdict::WrongOutput
        }
    }

    /// Advisory only: a passing test can carry a leak warning.
    pub fn detect_leak(&self, outcome: &ExecutionOutcome) -> Option<MemoryLeakWarning> {
        let (Some(before_mb), Some(peak_mb)) = (outcome.memory_before, outcome.memory_peak) else {
            return None
        };
        let delta_mb = peak_mb - before_mb;
        (delta_mb > self.leak_threshold_mb).then_some(MemoryLeakWarning {
            before_mb,
            peak_mb,
            delta_mb,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const BUDGET: Duration = Duration::from_secs(10);

    fn exited(code: i32, before: f64, peak: f64) -> ExecutionOutcome {
        ExecutionOutcome::exited(
            Some(code),
            None,
            before,
            peak,
            Duration::from_millis(5),
            String::new(),
        )
    }

    fn judge(outcome: ExecutionOutcome, actual: &str, expected: &str) -> TestReport {
        VerdictEvaluator::default().evaluate(outcome, actual, expected, 1, BUDGET)
    }

    #[test]
    fn trailing_newline_is_trimmed() {
        let r = judge(exited(0, 1.0, 1.0), "6\n", "6");
        assert_eq!(r.verdict, Verdict::Passed);
        assert_eq!(r.leak, None);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed_on_both_sides() {
        let r = judge(exited(0, 1.0, 1.0), "  1 2\n3\n\n", "\n1 2\n3 ");
        assert_eq!(r.verdict, Verdict::Passed);
    }

    #[test]
    fn inner_whitespace_is_significant() {
        let r = judge(exited(0, 1.0, 1.0), "1  2\n", "1 2\n");
        assert_eq!(r.verdict, Verdict::WrongOutput);
        let r = judge(exited(0, 1.0, 1.0), "1 \n2\n", "1\n2\n");
        assert_eq!(r.verdict, Verdict::WrongOutput);
    }

    #[test]
    fn different_output_is_wrong() {
        let r = judge(exited(0, 1.0, 1.0), "7\n", "6\n");
        assert_eq!(r.verdict, Verdict::WrongOutput);
        assert_eq!(r.actual, "7\n");
        assert_eq!(r.expected, "6\n");
    }

    #[test]
    fn nonzero_exit_is_runtime_error_even_with_correct_output() {
        let r = judge(exited(1, 1.0, 1.0), "6\n", "6\n");
        assert_eq!(r.verdict, Verdict::RuntimeError);
    }

    #[test]
    fn signal_death_is_runtime_error() {
        let outcome = ExecutionOutcome::exited(
            None,
            Some(11),
            1.0,
            1.0,
            Duration::ZERO,
            String::new(),
        );
        assert_eq!(judge(outcome, "", "").verdict, Verdict::RuntimeError);
    }

    #[test]
    fn timeout_wins_and_has_no_leak() {
        let outcome = ExecutionOutcome::timed_out(BUDGET, String::new());
        let r = judge(outcome, "", "6");
        assert_eq!(r.verdict, Verdict::Timeout);
        assert_eq!(r.leak, None);
    }

    #[test]
    fn passing_test_can_carry_leak_warning() {
        let r = judge(exited(0, 10.0, 70.0), "6\n", "6");
        assert_eq!(r.verdict, Verdict::Passed);
        let leak = r.leak.unwrap();
        assert_eq!(leak.delta_mb, 60.0);
        assert_eq!(leak.before_mb, 10.0);
        assert_eq!(leak.peak_mb, 70.0);
    }

    #[test]
    fn leak_threshold_is_exclusive() {
        let e = VerdictEvaluator::default();
        assert_eq!(e.detect_leak(&exited(0, 10.0, 60.0)), None);
        assert!(e.detect_leak(&exited(0, 10.0, 60.5)).is_some());
        assert!(VerdictEvaluator::new(5.0)
            .detect_leak(&exited(0, 10.0, 16.0))
            .is_some());
    }

    #[test]
    fn same_outcome_same_verdict() {
        let a = judge(exited(0, 1.0, 2.0), "ok", "ok");
        let b = judge(exited(0, 1.0, 2.0), "ok", "ok");
        assert_eq!(a, b);
    }

    #[test]
    fn precheck_reports_missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let files = TestcaseFiles::locate(tmp.path(), 3);
        assert_eq!(
            VerdictEvaluator::precheck(&files),
            Some(Verdict::InputMissing)
        );

        std::fs::write(&files.input, "1\n").unwrap();
        assert_eq!(
            VerdictEvaluator::precheck(&files),
            Some(Verdict::ExpectedOutputMissing)
        );

        std::fs::write(&files.expected, "1\n").unwrap();
        assert_eq!(VerdictEvaluator::precheck(&files), None);
    }
}
