use std::io::Write;

use benford_core::{BenfordReport, Job, StatusBucket, User};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

pub fn print_users(w: &mut dyn Write, users: &[User], color: ColorMode) -> std::io::Result<()> {
    if users.is_empty() {
        writeln!(w, "No users.")?;
        return Ok(());
    }
    for user in users {
        if color.enabled() {
            writeln!(w, "{:>8}  {}", user.id.0.bold(), user.username)?;
        } else {
            writeln!(w, "{:>8}  {}", user.id.0, user.username)?;
        }
    }
    Ok(())
}

pub fn print_jobs(w: &mut dyn Write, jobs: &[Job], color: ColorMode) -> std::io::Result<()> {
    if jobs.is_empty() {
        writeln!(w, "No jobs.")?;
        return Ok(());
    }
    for job in jobs {
        write!(
            w,
            "{:>6}  user {:<6} {:<10} ",
            job.id.0,
            job.user_id.0,
            job.kind.as_str()
        )?;
        print_status_inline(w, &job.status, color)?;
        writeln!(w, "  {}", job.original_file)?;
    }
    Ok(())
}

/// Print a status string colored by its bucket.
pub fn print_status(w: &mut dyn Write, status: &str, color: ColorMode) -> std::io::Result<()> {
    print_status_inline(w, status, color)?;
    writeln!(w)
}

fn print_status_inline(w: &mut dyn Write, status: &str, color: ColorMode) -> std::io::Result<()> {
    if !color.enabled() {
        return write!(w, "{}", status);
    }
    match StatusBucket::classify(status) {
        Some(StatusBucket::Completed) => write!(w, "{}", status.green()),
        Some(StatusBucket::Error) => write!(w, "{}", status.red()),
        Some(StatusBucket::Processing) => write!(w, "{}", status.yellow()),
        Some(StatusBucket::Uploaded) | None => write!(w, "{}", status.dimmed()),
    }
}

pub fn print_error(w: &mut dyn Write, message: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "ERROR:".red().bold(), message)
    } else {
        writeln!(w, "ERROR: {}", message)
    }
}

/// Print a benford artifact as a table of observed against expected shares.
///
/// Digit 0 is never a leading digit and is left out of the table.
pub fn print_benford_report(
    w: &mut dyn Write,
    report: &BenfordReport,
    color: ColorMode,
) -> std::io::Result<()> {
    let total = report.histogram.total();
    writeln!(
        w,
        "{} pages, {} numbers with a leading digit",
        report.pages, total
    )?;
    writeln!(w)?;

    let header = format!("{:>5}  {:>8}  {:>9}  {:>9}", "digit", "count", "observed", "benford");
    if color.enabled() {
        writeln!(w, "{}", header.bold())?;
    } else {
        writeln!(w, "{}", header)?;
    }

    for (digit, observed, expected) in report.distribution() {
        let row = format!(
            "{:>5}  {:>8}  {:>8.1}%  {:>8.1}%",
            digit,
            report.histogram.count(digit),
            observed * 100.0,
            expected * 100.0
        );
        // More than 5 points off the curve.
        let off = total > 0 && (observed - expected).abs() > 0.05;
        if color.enabled() && off {
            writeln!(w, "{}", row.yellow())?;
        } else {
            writeln!(w, "{}", row)?;
        }
    }
    Ok(())
}
