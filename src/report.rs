//! Plain-text rendering of jobs, dashboard counters and port results.
use std::fs::File;
use std::path::Path;

use anyhow::Result;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::types::{DashboardStats, Job, JobStatus, ResultsPage};

pub fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "Pending",
        JobStatus::Running => "Running",
        JobStatus::Completed => "Completed",
        JobStatus::Failed => "Failed",
        JobStatus::Cancelled => "Cancelled",
        JobStatus::Unknown => "Unknown",
    }
}

/// Short age of a timestamp relative to `now`: "just now" or "N min ago"
/// within the hour, the clock time later the same day, otherwise the date.
/// Unparsable input is returned unchanged.
pub fn format_relative(timestamp: &str, now: OffsetDateTime) -> String {
    let Ok(then) = OffsetDateTime::parse(timestamp, &Rfc3339) else {
        return timestamp.to_string();
    };
    let then = then.to_offset(now.offset());
    let elapsed = now - then;
    if elapsed.whole_minutes() < 60 {
        let minutes = elapsed.whole_minutes().max(0);
        return if minutes <= 1 {
            "just now".to_string()
        } else {
            format!("{minutes} min ago")
        };
    }
    if then.date() == now.date() {
        let fmt = format_description!("[hour]:[minute]");
        return then.format(fmt).unwrap_or_else(|_| timestamp.to_string());
    }
    let fmt = format_description!("[year]-[month]-[day]");
    then.format(fmt).unwrap_or_else(|_| timestamp.to_string())
}

/// `45s`, `2m 5s`, `1h 3m`.
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 3600 {
        return format!("{}m {}s", seconds / 60, seconds % 60);
    }
    format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
}

pub fn print_stats(stats: &DashboardStats) {
    println!("Total scans  : {}", stats.total_scans);
    println!("Active scans : {}", stats.active_scans);
    println!("Hosts found  : {}", stats.hosts_found);
    println!("Open ports   : {}", stats.open_ports);
}

/// One line per job, or a notice when there are none.
pub fn job_lines(jobs: &[Job], now: OffsetDateTime) -> Vec<String> {
    if jobs.is_empty() {
        return vec!["No scans found".to_string()];
    }
    jobs.iter()
        .map(|job| {
            let when = job
                .created_at
                .as_deref()
                .map(|t| format_relative(t, now))
                .unwrap_or_default();
            format!(
                "{:<10} {:<24} {} | {} | {}  ({})",
                status_label(job.status),
                job.target,
                job.ports,
                job.protocols.join(", ").to_uppercase(),
                when,
                job.id
            )
        })
        .collect()
}

pub fn print_results_table(page: &ResultsPage) {
    let mut host_w = "host".len();
    let mut status_w = "status".len();
    for e in &page.results {
        host_w = host_w.max(e.host.len());
        status_w = status_w.max(e.status.len());
    }
    let port_w = 5usize;
    let proto_w = "proto".len();
    let rt_w = "response_ms".len();

    let open = page.results.iter().filter(|e| e.status == "open").count();
    println!("\nResults: {} (open: {})", page.count.max(page.results.len() as u64), open);
    println!(
        "{:<host_w$}  {:>port_w$}  {:<proto_w$}  {:<status_w$}  {:>rt_w$}",
        "host", "port", "proto", "status", "response_ms",
    );
    println!(
        "{:-<host_w$}  {:-<port_w$}  {:-<proto_w$}  {:-<status_w$}  {:-<rt_w$}",
        "", "", "", "", "",
    );
    for e in &page.results {
        let rt = e
            .response_time
            .map(|ms| format!("{ms:.1}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<host_w$}  {:>port_w$}  {:<proto_w$}  {:<status_w$}  {:>rt_w$}",
            e.host,
            e.port,
            e.protocol.to_lowercase(),
            e.status,
            rt,
        );
    }
}

pub fn write_results_json(path: &Path, page: &ResultsPage) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, page)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobId;
    use time::macros::datetime;

    #[test]
    fn relative_times() {
        let now = datetime!(2024-05-10 15:30:00 UTC);
        assert_eq!(format_relative("2024-05-10T15:29:30Z", now), "just now");
        assert_eq!(format_relative("2024-05-10T15:04:30.123456Z", now), "25 min ago");
        assert_eq!(format_relative("2024-05-10T09:15:00+00:00", now), "09:15");
        assert_eq!(format_relative("2024-04-01T09:15:00Z", now), "2024-04-01");
        assert_eq!(format_relative("yesterday", now), "yesterday");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3780), "1h 3m");
    }

    #[test]
    fn lists_jobs() {
        let now = datetime!(2024-05-10 15:30:00 UTC);
        assert_eq!(job_lines(&[], now), vec!["No scans found"]);
        let job = Job {
            id: JobId::new("abc123"),
            target: "192.168.1.1".into(),
            ports: "common".into(),
            protocols: vec!["tcp".into(), "udp".into()],
            created_at: Some("2024-05-10T15:20:00Z".into()),
            status: JobStatus::Completed,
        };
        let lines = job_lines(&[job], now);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Completed"));
        assert!(lines[0].contains("TCP, UDP"));
        assert!(lines[0].contains("10 min ago"));
        assert!(lines[0].ends_with("(abc123)"));
    }
}
