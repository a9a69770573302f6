use std::fmt::Write;

use cacheburn_core::{ReportFormat, StatsSnapshot};

pub fn render(snapshot: &StatsSnapshot, format: ReportFormat) -> String {
    match format {
        ReportFormat::Json => render_json(snapshot),
        ReportFormat::Text => render_text(snapshot),
    }
}

fn render_json(snapshot: &StatsSnapshot) -> String {
    serde_json::to_string(snapshot).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

fn render_text(s: &StatsSnapshot) -> String {
    let mut out = String::new();
    // writes into a String cannot fail
    let _ = writeln!(out, "Elapsed Time: {:.2}s", s.elapsed_secs);
    let _ = writeln!(out, "Total Number of Requests Processed: {}", s.total_requests);
    let _ = writeln!(out, "Total Number of Failed Requests: {}", s.total_failed);
    let _ = writeln!(out, "Error Rate: {:.2}%", s.error_rate() * 100.0);
    let _ = writeln!(out, "QPS: {:.3}", s.qps);
    let _ = writeln!(out, "Global Average TTFT: {:.4}s", s.running.ttft);
    let _ = writeln!(out, "Global Average ITL: {:.4}s", s.running.itl);
    let _ = writeln!(
        out,
        "Global Average Prefill Throughput: {:.1} chars/s",
        s.running.prefill_throughput
    );
    let _ = writeln!(
        out,
        "Global Average Decode Throughput: {:.1} chars/s",
        s.running.decode_throughput
    );
    let _ = writeln!(
        out,
        "Requests Processed in Last {} second Interval: {}",
        s.interval_secs, s.interval_requests
    );
    let _ = writeln!(out, "Requests Failed in Last Interval: {}", s.interval_failed);

    if let Some(interval) = &s.interval {
        let _ = writeln!(out, "Interval Average TTFT: {:.4}s", interval.ttft);
        let _ = writeln!(out, "Interval Average ITL: {:.4}s", interval.itl);
        let _ = writeln!(
            out,
            "Interval Average Prefill Throughput: {:.1} chars/s",
            interval.prefill_throughput
        );
        let _ = writeln!(
            out,
            "Interval Average Decode Throughput: {:.1} chars/s",
            interval.decode_throughput
        );
    }
    out
}
