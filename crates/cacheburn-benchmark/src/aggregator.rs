use std::time::{Duration, Instant};

use cacheburn_core::{
    DecodePair, LatencyAverages, PrefillPair, ReportFormat, RequestStats, StatsSnapshot,
};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::report;

/// Outcome of one dispatched request, sent from executor tasks to the
/// aggregator task.
#[derive(Debug, Clone)]
pub enum RequestEvent {
    Finished(RequestStats),
    Failed { reason: String },
}

/// Two-level statistics: an interval buffer filled by finished requests and
/// running averages that the buffer is folded into once per tick.
#[derive(Debug)]
pub struct StatsAggregator {
    num_requests: u64,
    total_failed: u64,
    interval_requests: u64,
    interval_failed: u64,
    interval_prefill_stats: Vec<PrefillPair>,
    interval_decode_stats: Vec<DecodePair>,
    running: LatencyAverages,
    start_time: Instant,
    report_interval: Duration,
}

impl StatsAggregator {
    pub fn new(report_interval: Duration) -> Self {
        Self::starting_at(Instant::now(), report_interval)
    }

    pub fn starting_at(start_time: Instant, report_interval: Duration) -> Self {
        Self {
            num_requests: 0,
            total_failed: 0,
            interval_requests: 0,
            interval_failed: 0,
            interval_prefill_stats: Vec::new(),
            interval_decode_stats: Vec::new(),
            running: LatencyAverages::default(),
            start_time,
            report_interval,
        }
    }

    pub fn record(&mut self, event: RequestEvent) {
        match event {
            RequestEvent::Finished(stats) => self.on_request_finished(&stats),
            RequestEvent::Failed { .. } => self.on_request_failed(),
        }
    }

    pub fn on_request_finished(&mut self, stats: &RequestStats) {
        self.interval_requests += 1;
        self.interval_prefill_stats.push(stats.prefill_pair());
        self.interval_decode_stats.push(stats.decode_pair());
    }

    pub fn on_request_failed(&mut self) {
        self.interval_failed += 1;
    }

    /// Requests folded into the running averages so far.
    pub fn num_requests(&self) -> u64 {
        self.num_requests
    }

    /// Finished requests waiting for the next fold.
    pub fn pending_requests(&self) -> u64 {
        self.interval_requests
    }

    pub fn total_failed(&self) -> u64 {
        self.total_failed
    }

    pub fn running(&self) -> LatencyAverages {
        self.running
    }

    /// Fold the interval buffer into the running averages.
    ///
    /// Returns `None` and leaves all state untouched when nothing completed
    /// in the interval. An interval with only failures updates the failure
    /// counters but not the averages.
    pub fn fold(&mut self, now: Instant) -> Option<StatsSnapshot> {
        if self.interval_prefill_stats.is_empty() && self.interval_failed == 0 {
            return None;
        }

        let interval = interval_averages(&self.interval_prefill_stats, &self.interval_decode_stats);

        if let Some(current) = interval {
            let total = self.num_requests + self.interval_requests;
            let old_weight = self.num_requests as f64 / total as f64;
            let new_weight = self.interval_requests as f64 / total as f64;

            self.running = LatencyAverages {
                ttft: old_weight * self.running.ttft + new_weight * current.ttft,
                itl: old_weight * self.running.itl + new_weight * current.itl,
                prefill_throughput: old_weight * self.running.prefill_throughput
                    + new_weight * current.prefill_throughput,
                decode_throughput: old_weight * self.running.decode_throughput
                    + new_weight * current.decode_throughput,
            };
            self.num_requests = total;
        }
        self.total_failed += self.interval_failed;

        let elapsed_secs = now.saturating_duration_since(self.start_time).as_secs_f64();
        let qps = match elapsed_secs > 0.0 {
            true => self.num_requests as f64 / elapsed_secs,
            false => 0.0,
        };

        let snapshot = StatsSnapshot {
            elapsed_secs,
            total_requests: self.num_requests,
            total_failed: self.total_failed,
            qps,
            running: self.running,
            interval_secs: self.report_interval.as_secs(),
            interval_requests: self.interval_requests,
            interval_failed: self.interval_failed,
            interval,
        };

        self.interval_prefill_stats.clear();
        self.interval_decode_stats.clear();
        self.interval_requests = 0;
        self.interval_failed = 0;

        Some(snapshot)
    }
}

/// Per-record means over one interval, `None` for an empty interval.
fn interval_averages(prefill: &[PrefillPair], decode: &[DecodePair]) -> Option<LatencyAverages> {
    if prefill.is_empty() || decode.is_empty() {
        return None;
    }
    let n_prefill = prefill.len() as f64;
    let n_decode = decode.len() as f64;

    let ttft = prefill.iter().map(|p| p.prefill_time).sum::<f64>() / n_prefill;
    // +1 for the end-of-sequence token that never shows up as text
    let itl = decode
        .iter()
        .map(|d| d.decode_time / (d.output_length as f64 + 1.0))
        .sum::<f64>()
        / n_decode;
    let prefill_throughput = prefill
        .iter()
        .map(|p| p.input_length as f64 / p.prefill_time)
        .sum::<f64>()
        / n_prefill;
    let decode_throughput = decode
        .iter()
        .map(|d| d.output_length as f64 / d.decode_time)
        .sum::<f64>()
        / n_decode;

    Some(LatencyAverages {
        ttft,
        itl,
        prefill_throughput,
        decode_throughput,
    })
}

/// Own the aggregator for the lifetime of the run: ingest events as they
/// arrive and fold/print on every tick. Returns once every sender is gone,
/// after a final fold.
pub async fn run_aggregator(
    mut aggregator: StatsAggregator,
    mut events: mpsc::UnboundedReceiver<RequestEvent>,
    format: ReportFormat,
) -> StatsAggregator {
    let mut ticker = tokio::time::interval(aggregator.report_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => aggregator.record(event),
                None => break,
            },
            _ = ticker.tick() => match aggregator.fold(Instant::now()) {
                Some(snapshot) => println!("{}", report::render(&snapshot, format)),
                None => debug!("No requests completed this interval"),
            },
        }
    }

    info!("All request senders closed, printing final statistics");
    if let Some(snapshot) = aggregator.fold(Instant::now()) {
        println!("{}", report::render(&snapshot, format));
    }
    aggregator
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn stats(
        base: Instant,
        prefill_ms: u64,
        decode_ms: u64,
        input: usize,
        output: usize,
    ) -> RequestStats {
        let first = base + Duration::from_millis(prefill_ms);
        let end = first + Duration::from_millis(decode_ms);
        RequestStats::new(base, Some(first), end, input, output).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= EPS * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn test_single_interval_equals_plain_mean() {
        let base = Instant::now();
        let mut agg = StatsAggregator::starting_at(base, Duration::from_secs(5));

        let prefill_ms = [100, 200, 300, 400, 500, 600];
        for (i, ms) in prefill_ms.iter().enumerate() {
            agg.on_request_finished(&stats(base, *ms, 1000, 64_000 + i, 99));
        }

        let snapshot = agg.fold(base + Duration::from_secs(5)).unwrap();
        assert_eq!(snapshot.total_requests, 6);
        assert_eq!(snapshot.interval_requests, 6);
        assert!(close(snapshot.running.ttft, 0.35));
        assert_eq!(snapshot.interval, Some(snapshot.running));
        // 1 s of decode over 99 chars + EOS
        assert!(close(snapshot.running.itl, 0.01));
        assert!(close(snapshot.running.decode_throughput, 99.0));
        assert!(close(snapshot.qps, 6.0 / 5.0));
    }

    #[test]
    fn test_throughput_is_mean_of_per_record_ratios() {
        let base = Instant::now();
        let mut agg = StatsAggregator::starting_at(base, Duration::from_secs(5));
        agg.on_request_finished(&stats(base, 1000, 500, 1000, 10));
        agg.on_request_finished(&stats(base, 4000, 2000, 1000, 10));

        let snapshot = agg.fold(base + Duration::from_secs(5)).unwrap();
        // (1000/1 + 1000/4) / 2, not 2000/5
        assert!(close(snapshot.running.prefill_throughput, 625.0));
        // (10/0.5 + 10/2) / 2
        assert!(close(snapshot.running.decode_throughput, 12.5));
    }

    #[test]
    fn test_sequential_folds_match_single_fold() {
        let base = Instant::now();
        let first: Vec<RequestStats> = (0..3u64)
            .map(|i| stats(base, 50 + i * 70, 900 + i * 11, 1000 * (i as usize + 1), 40))
            .collect();
        let second: Vec<RequestStats> = (0..5u64)
            .map(|i| stats(base, 400 - i * 30, 300 + i * 97, 5000, 80 + i as usize))
            .collect();

        let mut split = StatsAggregator::starting_at(base, Duration::from_secs(5));
        first.iter().for_each(|s| split.on_request_finished(s));
        split.fold(base + Duration::from_secs(5)).unwrap();
        second.iter().for_each(|s| split.on_request_finished(s));
        split.fold(base + Duration::from_secs(10)).unwrap();

        let mut whole = StatsAggregator::starting_at(base, Duration::from_secs(5));
        first.iter().chain(second.iter()).for_each(|s| whole.on_request_finished(s));
        whole.fold(base + Duration::from_secs(10)).unwrap();

        assert_eq!(split.num_requests(), 8);
        assert_eq!(whole.num_requests(), 8);
        let (a, b) = (split.running(), whole.running());
        assert!(close(a.ttft, b.ttft));
        assert!(close(a.itl, b.itl));
        assert!(close(a.prefill_throughput, b.prefill_throughput));
        assert!(close(a.decode_throughput, b.decode_throughput));
    }

    #[test]
    fn test_empty_interval_leaves_state_untouched() {
        let base = Instant::now();
        let mut agg = StatsAggregator::starting_at(base, Duration::from_secs(5));
        assert!(agg.fold(base + Duration::from_secs(5)).is_none());

        agg.on_request_finished(&stats(base, 200, 800, 100, 7));
        agg.fold(base + Duration::from_secs(10)).unwrap();
        let before = agg.running();

        assert!(agg.fold(base + Duration::from_secs(15)).is_none());
        assert!(agg.fold(base + Duration::from_secs(20)).is_none());
        assert_eq!(agg.num_requests(), 1);
        assert_eq!(agg.running(), before);
    }

    #[test]
    fn test_fold_clears_interval_buffers() {
        let base = Instant::now();
        let mut agg = StatsAggregator::starting_at(base, Duration::from_secs(5));
        agg.on_request_finished(&stats(base, 10, 10, 1, 1));
        agg.on_request_finished(&stats(base, 10, 10, 1, 1));
        assert_eq!(agg.pending_requests(), 2);

        agg.fold(base + Duration::from_secs(1)).unwrap();
        assert_eq!(agg.pending_requests(), 0);
        assert_eq!(agg.num_requests(), 2);

        agg.on_request_finished(&stats(base, 10, 10, 1, 1));
        assert_eq!(agg.num_requests() + agg.pending_requests(), 3);
    }

    #[test]
    fn test_failures_counted_but_not_averaged() {
        let base = Instant::now();
        let mut agg = StatsAggregator::starting_at(base, Duration::from_secs(5));
        agg.record(RequestEvent::Finished(stats(base, 100, 100, 10, 10)));
        agg.record(RequestEvent::Failed { reason: "reset".to_string() });
        let snapshot = agg.fold(base + Duration::from_secs(5)).unwrap();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.interval_failed, 1);
        let running = agg.running();

        // failure-only interval: reported, averages untouched
        agg.record(RequestEvent::Failed { reason: "empty".to_string() });
        let snapshot = agg.fold(base + Duration::from_secs(10)).unwrap();
        assert!(snapshot.interval.is_none());
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.total_failed, 2);
        assert_eq!(agg.running(), running);
    }

    #[tokio::test]
    async fn test_run_aggregator_drains_and_folds_on_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let base = Instant::now();
        let agg = StatsAggregator::new(Duration::from_secs(3600));

        let handle = tokio::spawn(run_aggregator(agg, rx, ReportFormat::Json));
        for i in 0..4 {
            tx.send(RequestEvent::Finished(stats(base, 10 + i, 20, 50, 5))).unwrap();
        }
        tx.send(RequestEvent::Failed { reason: "boom".to_string() }).unwrap();
        drop(tx);

        let agg = handle.await.unwrap();
        assert_eq!(agg.num_requests(), 4);
        assert_eq!(agg.pending_requests(), 0);
        assert_eq!(agg.total_failed(), 1);
    }
}
