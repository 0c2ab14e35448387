use std::io::IsTerminal;

use chrono::SecondsFormat;
use kvseries_core::Report;
use kvseries_core::query::{AppendSummary, BucketStatus, BucketSummary, RangeResponse};
use owo_colors::OwoColorize;

pub fn print_range_human(v: &RangeResponse) {
    let color = std::io::stdout().is_terminal();
    if let Some(group) = &v.group {
        println!("GROUP {group}");
    }
    for report in &v.reports {
        println!("{}", format_report(report, color));
    }
    println!(
        "-- {} reports {}..{} --",
        v.reports.len(),
        v.date_start,
        v.date_end
    );
    let color = std::io::stderr().is_terminal();
    for bucket in &v.buckets {
        if let Some(line) = bucket_note(bucket, color) {
            eprintln!("{line}");
        }
    }
}

pub fn print_append_human(v: &AppendSummary) {
    let color = std::io::stderr().is_terminal();
    for failure in &v.failed {
        let tag = paint("FAILED", color, |s| s.red().to_string());
        eprintln!("{tag} {} {}", failure.key, failure.error);
    }
    println!("-- {} appended, {} failed --", v.appended, v.failed.len());
}

pub fn print_keys_human(keys: &[String]) {
    for key in keys {
        println!("{key}");
    }
}

fn format_report(report: &Report, color: bool) -> String {
    let labels = report
        .metadata
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "{} {} {} {}",
        report.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        paint(&report.series, color, |s| s.cyan().to_string()),
        report.value,
        labels
    )
    .trim_end()
    .to_string()
}

fn bucket_note(bucket: &BucketSummary, color: bool) -> Option<String> {
    match &bucket.status {
        BucketStatus::Loaded { .. } => None,
        BucketStatus::Missing => {
            let tag = paint("missing", color, |s| s.bright_black().to_string());
            Some(format!("{tag} {}", bucket.key))
        }
        BucketStatus::Failed { error } => {
            let tag = paint("failed", color, |s| s.yellow().to_string());
            Some(format!("{tag} {} {error}", bucket.key))
        }
    }
}

fn paint(text: &str, color: bool, style: impl Fn(&str) -> String) -> String {
    if color { style(text) } else { text.to_string() }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    #[test]
    fn formats_report_line() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let line = format_report(&Report::new("cpu", 0.5, ts).with_label("host", "a"), false);
        assert_eq!(line, "2026-02-01T09:00:00Z cpu 0.5 host=a");

        let bare = format_report(&Report::new("mem", 2.0, ts), false);
        assert_eq!(bare, "2026-02-01T09:00:00Z mem 2");
    }

    #[test]
    fn paints_only_when_asked() {
        assert_eq!(paint("x", false, |s| s.red().to_string()), "x");
        assert_ne!(paint("x", true, |s| s.red().to_string()), "x");
    }

    #[test]
    fn notes_only_unloaded_buckets() {
        let day = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let mut bucket = BucketSummary {
            day,
            key: "ts_2026_02_01".into(),
            status: BucketStatus::Loaded { count: 1 },
        };
        assert!(bucket_note(&bucket, false).is_none());

        bucket.status = BucketStatus::Failed {
            error: "timed out".into(),
        };
        assert_eq!(
            bucket_note(&bucket, false).unwrap(),
            "failed ts_2026_02_01 timed out"
        );
    }
}
