//! Console output for the bootstrap CLI.

use colored::Colorize;

use crate::orchestrator::{PreconditionState, RunResult, RunState};
use crate::preflight::{CheckOutcome, CheckStatus};
use crate::step::{StepRecord, StepResult};

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", "═".repeat(60).bright_black());
    println!("{}", title.cyan().bold());
    println!("{}", "═".repeat(60).bright_black());
    println!();
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("  {} {}", format!("{key}:").bright_black(), value.green());
}

/// Print one preflight check.
pub fn print_check_result(check: &CheckOutcome) {
    let (mark, detail) = match &check.status {
        CheckStatus::Pass(d) => ("✓".green(), d.normal()),
        CheckStatus::Warn(d) => ("⚠".yellow(), d.yellow()),
        CheckStatus::Fail(d) => ("✗".red(), d.red()),
    };
    println!("  {mark} {} - {detail}", check.name);
    if check.is_failure() {
        println!("      {}", check.install_instructions.bright_black());
    }
}

fn print_record(position: usize, total: usize, record: &StepRecord) {
    let counter = format!("[{position}/{total}]").bright_black();
    let secs = format!("{:.1}s", record.duration.as_secs_f64()).bright_black();
    match &record.result {
        StepResult::Success => println!(
            "{counter} {} {} {secs}",
            "✓".green().bold(),
            record.name.bold()
        ),
        StepResult::SkippedAlreadySatisfied => println!(
            "{counter} {} {} {}",
            "↷".bright_black(),
            record.name,
            "already satisfied".bright_black()
        ),
        StepResult::Failed { kind, reason } => {
            println!(
                "{counter} {} {} {}",
                "✗".red().bold(),
                record.name.bold(),
                kind.to_string().red()
            );
            println!("      {}", reason.red());
        }
    }
}

/// Print per-step lines and the final verdict.
pub fn print_run_summary(title: &str, total_steps: usize, result: &RunResult) {
    print_section(title);
    print_kv("Host", &result.host);
    print_kv("Started", &result.started_at);
    println!();

    for (i, record) in result.records.iter().enumerate() {
        print_record(i + 1, total_steps, record);
    }
    let not_run = total_steps.saturating_sub(result.records.len());
    if not_run > 0 {
        println!(
            "{}",
            format!("  {not_run} step(s) not run").bright_black()
        );
    }

    if !result.warnings.is_empty() {
        println!();
        for warning in &result.warnings {
            print_warning(&format!("{}: {}", warning.resource, warning.detail));
        }
    }

    println!();
    match &result.state {
        RunState::Succeeded => print_success(&format!(
            "Completed ({} executed, {} skipped)",
            result.executed_count(),
            result.records.len() - result.executed_count()
        )),
        RunState::Failed { step, kind, .. } => {
            print_error(&format!("Failed at '{step}': {kind} (exit {})", kind.exit_code()));
        }
        RunState::NotStarted | RunState::Running { .. } => {
            print_info("Run did not complete");
        }
    }
}

/// Print precondition states for `status`.
pub fn print_status(states: &[(&'static str, PreconditionState)]) {
    for (name, state) in states {
        match state {
            PreconditionState::Satisfied => {
                println!("  {} {name:<28} {}", "✓".green(), "satisfied".green());
            }
            PreconditionState::Pending => {
                println!("  {} {name:<28} {}", "○".yellow(), "pending".yellow());
            }
            PreconditionState::Error(e) => {
                println!("  {} {name:<28} {}", "✗".red(), format!("error: {e}").red());
            }
        }
    }
}
