use std::time::Duration;

/// What the execution monitor observed about one run of the program.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub completed: bool,
    pub timed_out: bool,
    pub exit_status: Option<i32>,
    /// Terminating signal, when the process was killed by one (unix only).
    pub signal: Option<i32>,
    /// Resident memory right after launch, in MB.
    pub memory_before: Option<f64>,
    /// Highest resident memory observed while polling, in MB.
    pub memory_peak: Option<f64>,
    pub elapsed: Duration,
    pub stderr: String,
}

impl ExecutionOutcome {
    pub fn exited(
        exit_status: Option<i32>,
        signal: Option<i32>,
        memory_before: f64,
        memory_peak: f64,
        elapsed: Duration,
        stderr: String,
    ) -> Self {
        Self {
            completed: true,
            timed_out: false,
            exit_status,
            signal,
            memory_before: Some(memory_before),
            memory_peak: Some(memory_peak.max(memory_before)),
            elapsed,
            stderr,
        }
    }

    pub fn timed_out(elapsed: Duration, stderr: String) -> Self {
        Self {
            completed: false,
            timed_out: true,
            exit_status: None,
            signal: None,
            memory_before: None,
            memory_peak: None,
            elapsed,
            stderr,
        }
    }

    pub fn is_success(&self) -> bool {
        self.completed && self.exit_status == Some(0)
    }

    /// `peak - before`, when both readings exist.
    pub fn memory_increase(&self) -> Option<f64> {
        match (self.memory_before, self.memory_peak) {
            (Some(before), Some(peak)) => Some(peak - before),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr)]
pub enum Verdict {
    #[strum(serialize = "AC")]
    Passed,
    #[strum(serialize = "WA")]
    WrongOutput,
    #[strum(serialize = "RE")]
    RuntimeError,
    #[strum(serialize = "TLE")]
    Timeout,
    #[strum(serialize = "NOIN")]
    InputMissing,
    #[strum(serialize = "NOOUT")]
    ExpectedOutputMissing,
}

impl Verdict {
    /// Short badge text, e.g. `AC` or `TLE`.
    pub fn code(self) -> &'static str {
        self.into()
    }

    pub fn is_passed(self) -> bool {
        self == Verdict::Passed
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryLeakWarning {
    pub before_mb: f64,
    pub peak_mb: f64,
    pub delta_mb: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub test_id: u32,
    pub verdict: Verdict,
    pub leak: Option<MemoryLeakWarning>,
    /// Absent when the test was rejected before anything was launched.
    pub outcome: Option<ExecutionOutcome>,
    pub actual: String,
    pub expected: String,
    pub budget: Duration,
}

impl TestReport {
    pub fn not_launched(test_id: u32, verdict: Verdict, budget: Duration) -> Self {
        Self {
            test_id,
            verdict,
            leak: None,
            outcome: None,
            actual: String::new(),
            expected: String::new(),
            budget,
        }
    }
}
