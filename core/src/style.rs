use std::collections::HashMap;

use colored::{Color, ColoredString, Colorize};
use crossterm::terminal;

use crate::testing::{ExecutionOutcome, MemoryLeakWarning, TestReport, Verdict};

#[macro_export]
macro_rules! print_success {
    ($fmt:literal, $($e:tt)*) => {
        use ::colored::Colorize as _;
        println!("{}", format!($fmt, $($e)*).green())
    }
}

pub fn is_truecolor_supported() -> bool {
    let Ok(v) = std::env::var("COLORTERM") else {
        return false
    };
    matches!(v.as_str(), "truecolor" | "24bit")
}

pub trait ColorTheme {
    fn color(&self) -> Color;
}

impl ColorTheme for Verdict {
    fn color(&self) -> Color {
        use Verdict::*;
        if !self::is_truecolor_supported() {
            return match self {
                Passed => Color::Green,
                WrongOutput => Color::Yellow,
                Timeout => Color::Red,
                RuntimeError => Color::Magenta,
                InputMissing | ExpectedOutputMissing => Color::Blue,
            };
        }

        match self {
            Passed => Color::TrueColor {
                r: 30,
                g: 180,
                b: 40,
            },
            WrongOutput => Color::TrueColor {
                r: 210,
                g: 138,
                b: 4,
            },
            Timeout => Color::TrueColor {
                r: 220,
                g: 42,
                b: 42,
            },
            RuntimeError => Color::TrueColor {
                r: 171,
                g: 40,
                b: 200,
            },
            InputMissing | ExpectedOutputMissing => Color::TrueColor {
                r: 70,
                g: 110,
                b: 200,
            },
        }
    }
}

pub fn judge_icon(verdict: Verdict) -> ColoredString {
    let fg = if is_truecolor_supported() {
        Color::TrueColor {
            r: 255,
            g: 255,
            b: 255,
        }
    } else {
        Color::BrightBlack
    };
    format!(" {} ", verdict.code())
        .on_color(verdict.color())
        .bold()
        .color(fg)
}

/// `Test 3 Passed`, `Test 4 Failed: Runtime error (exit status 1)`, ...
pub fn verdict_message(report: &TestReport) -> String {
    use Verdict::*;
    let id = report.test_id;
    match report.verdict {
        Passed => format!("Test {} Passed", id),
        WrongOutput => format!("Test {} Failed: Wrong output", id),
        RuntimeError => match report.outcome.as_ref().map(self::exit_description) {
            Some(desc) => format!("Test {} Failed: Runtime error ({})", id, desc),
            None => format!("Test {} Failed: Runtime error", id),
        },
        Timeout => format!(
            "Test {} Failed: Timeout ({}s)",
            id,
            report.budget.as_secs_f64()
        ),
        InputMissing => format!("Input file for test {} not found", id),
        ExpectedOutputMissing => format!("Expected output file for test {} not found", id),
    }
}

fn exit_description(outcome: &ExecutionOutcome) -> String {
    match (outcome.exit_status, outcome.signal) {
        (Some(code), _) => format!("exit status {}", code),
        (None, Some(sig)) => format!("killed by signal {}", sig),
        (None, None) => "abnormal termination".to_owned(),
    }
}

pub fn leak_message(test_id: u32, leak: &MemoryLeakWarning) -> String {
    format!(
        "Test {} Warning: Potential memory leak detected! Peak memory: {:.2} MB (start: {:.2} MB, increase: {:.2} MB)",
        test_id, leak.peak_mb, leak.before_mb, leak.delta_mb
    )
}

pub fn memory_ok_message(test_id: u32, outcome: &ExecutionOutcome) -> Option<String> {
    let peak = outcome.memory_peak?;
    let increase = outcome.memory_increase()?;
    Some(format!(
        "Test {} Memory OK: Peak {:.2} MB (increase: {:.2} MB)",
        test_id, peak, increase
    ))
}

/// One line for the verdict, plus a memory line for stress tests and a warning line
/// whenever a leak was detected.
pub fn print_report(report: &TestReport, is_stress: bool) {
    let elapsed = report
        .outcome
        .as_ref()
        .map(|o| format!(" [{}ms]", o.elapsed.as_millis()))
        .unwrap_or_default();
    let msg = self::verdict_message(report);
    let msg = if report.verdict.is_passed() {
        msg.green()
    } else {
        msg.bright_red()
    };
    println!("{} {}{}", judge_icon(report.verdict), msg, elapsed.dimmed());

    match (&report.leak, &report.outcome) {
        (Some(leak), _) => println!("{}", leak_message(report.test_id, leak).bright_yellow()),
        (None, Some(outcome)) if is_stress => {
            if let Some(msg) = memory_ok_message(report.test_id, outcome) {
                println!("{}", msg.cyan());
            }
        }
        _ => (),
    }
}

/// Prints a failure that happened while preparing or launching a test.
pub fn print_setup_failure(test_id: u32, err: &anyhow::Error) {
    println!(
        "{} {}",
        " ERR ".on_red().bold().bright_white(),
        format!("Test {} Failed: {:#}", test_id, err).bright_red()
    );
}

pub fn print_test_result_summary(reports: &[TestReport], num_setup_failures: usize) {
    let bar = "-".repeat(5);
    print!("{} ", bar);

    let count: HashMap<Verdict, usize> = reports.iter().fold(HashMap::new(), |mut count, r| {
        *count.entry(r.verdict).or_default() += 1;
        count
    });

    let num_total_test = reports.len() + num_setup_failures;
    let num_passed = *count.get(&Verdict::Passed).unwrap_or(&0);
    let num_failed = num_total_test - num_passed;
    let num_leaks = reports.iter().filter(|r| r.leak.is_some()).count();

    if num_total_test == 0 {
        print!("{}", "No tests were run".bright_yellow());
    } else if num_passed == num_total_test {
        let msg = format!("All {} tests passed ✨", num_total_test);
        print!("{}", msg.green());
    } else {
        let summary_msg = if num_passed > 0 {
            format!("{}/{} tests failed 💣", num_failed, num_total_test)
        } else {
            format!("All {} tests failed 💀", num_total_test)
        };

        let mut details = count
            .iter()
            .filter(|(&verdict, _)| verdict != Verdict::Passed)
            .map(|(&verdict, &cnt)| {
                format!(
                    "{}{}{}",
                    self::judge_icon(verdict),
                    "x".dimmed(),
                    cnt.to_string().bold().bright_white(),
                )
            })
            .collect::<Vec<String>>();
        if num_setup_failures > 0 {
            details.push(format!(
                "{}{}{}",
                " ERR ".on_red().bold().bright_white(),
                "x".dimmed(),
                num_setup_failures.to_string().bold().bright_white()
            ));
        }

        print!("{} ({})", summary_msg.bright_red(), details.join(", "));
    }

    if num_leaks > 0 {
        print!(
            "{}",
            format!(", {} with memory warnings", num_leaks).bright_yellow()
        );
    }

    println!(" {}", bar);
}

pub fn print_test_result_detail(res: &TestReport) {
    let stdout_lines: Vec<_> = res.actual.lines().collect();
    let truth_lines: Vec<_> = res.expected.lines().collect();

    let (cols, _) = terminal::size().unwrap_or((40, 40));

    const BOLD_LINE: &str = "━";
    const THIN_LINE: &str = "─";

    let bold_bar = BOLD_LINE.repeat(cols as usize).blue().bold();

    let title_color = Color::BrightYellow;
    println!(
        "\n{}: {}\n{}",
        format!("Test {}", res.test_id).color(title_color).bold(),
        self::judge_icon(res.verdict),
        bold_bar,
    );

    fn print_sub_title(s: &str, cols: usize) {
        println!(
            "{}{}",
            s.cyan().bold(),
            THIN_LINE
                .repeat(cols.saturating_sub(s.len() + 1))
                .bright_black(),
        )
    }

    fn print_lines(lines: &[&str]) {
        if lines.is_empty() {
            println!("{}", "<EMPTY>".magenta().dimmed());
            return;
        }
        for line in lines {
            println!("{}", line);
        }
    }

    print_sub_title("[expected]", cols as usize);
    print_lines(&truth_lines);

    print_sub_title("[stdout]", cols as usize);
    print_lines(&stdout_lines);

    if let Some(stderr) = res.outcome.as_ref().map(|o| &o.stderr) {
        if !stderr.is_empty() {
            print_sub_title("[stderr]", cols as usize);
            print!("{}", stderr);
        }
    }

    println!("{}", bold_bar);
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    fn report(verdict: Verdict, outcome: Option<ExecutionOutcome>) -> TestReport {
        TestReport {
            test_id: 4,
            verdict,
            leak: None,
            outcome,
            actual: String::new(),
            expected: String::new(),
            budget: Duration::from_secs(10),
        }
    }

    #[test]
    fn messages_per_verdict() {
        let exited = |code| {
            Some(ExecutionOutcome::exited(
                Some(code),
                None,
                0.0,
                0.0,
                Duration::ZERO,
                String::new(),
            ))
        };
        assert_eq!(
            verdict_message(&report(Verdict::Passed, exited(0))),
            "Test 4 Passed"
        );
        assert_eq!(
            verdict_message(&report(Verdict::WrongOutput, exited(0))),
            "Test 4 Failed: Wrong output"
        );
        assert_eq!(
            verdict_message(&report(Verdict::RuntimeError, exited(139))),
            "Test 4 Failed: Runtime error (exit status 139)"
        );
        assert_eq!(
            verdict_message(&report(Verdict::Timeout, None)),
            "Test 4 Failed: Timeout (10s)"
        );
        assert_eq!(
            verdict_message(&report(Verdict::InputMissing, None)),
            "Input file for test 4 not found"
        );
        assert_eq!(
            verdict_message(&report(Verdict::ExpectedOutputMissing, None)),
            "Expected output file for test 4 not found"
        );
    }

    #[test]
    fn leak_and_memory_lines() {
        let leak = MemoryLeakWarning {
            before_mb: 10.0,
            peak_mb: 70.0,
            delta_mb: 60.0,
        };
        assert_eq!(
            leak_message(6, &leak),
            "Test 6 Warning: Potential memory leak detected! Peak memory: 70.00 MB (start: 10.00 MB, increase: 60.00 MB)"
        );

        let o = ExecutionOutcome::exited(Some(0), None, 2.0, 3.5, Duration::ZERO, String::new());
        assert_eq!(
            memory_ok_message(6, &o).unwrap(),
            "Test 6 Memory OK: Peak 3.50 MB (increase: 1.50 MB)"
        );
        assert_eq!(
            memory_ok_message(6, &ExecutionOutcome::timed_out(Duration::ZERO, String::new())),
            None
        );
    }
}
