// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use serde::Serialize;
use std::time::{Duration, Instant};

/// Summary of a codec run
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    /// Jobs that completed successfully
    pub jobs_done: u64,
    /// Jobs whose buffers came back in the error state
    pub jobs_failed: u64,
    /// Payload bytes submitted on the output queue
    pub bytes_in: u64,
    /// Payload bytes returned on the capture queue
    pub bytes_out: u64,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Completed jobs per second
    pub throughput_fps: f64,
    /// Minimum queue-to-dequeue latency in microseconds
    pub latency_min_us: u64,
    /// Maximum queue-to-dequeue latency in microseconds
    pub latency_max_us: u64,
    /// Average queue-to-dequeue latency in microseconds
    pub latency_avg_us: u64,
    /// 50th percentile (median) latency in microseconds
    pub latency_p50_us: u64,
    /// 95th percentile latency in microseconds
    pub latency_p95_us: u64,
    /// 99th percentile latency in microseconds
    pub latency_p99_us: u64,
}

/// Collects per-job latencies and byte counts during a run
pub struct JobMetrics {
    start_time: Instant,
    latencies_us: Vec<u64>,
    failed: u64,
    bytes_in: u64,
    bytes_out: u64,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            latencies_us: Vec::new(),
            failed: 0,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    /// Record a successful job and how long it took from submission
    pub fn record_done(&mut self, latency: Duration, bytes_out: u64) {
        self.latencies_us
            .push(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
        self.bytes_out += bytes_out;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    pub fn record_bytes_in(&mut self, bytes: u64) {
        self.bytes_in += bytes;
    }

    /// Jobs finished either way
    pub fn finished(&self) -> u64 {
        self.latencies_us.len() as u64 + self.failed
    }

    /// Finalize and calculate all metrics
    pub fn finalize(&mut self) -> RunMetrics {
        let duration = self.start_time.elapsed();
        let duration_secs = duration.as_secs_f64();
        let jobs_done = self.latencies_us.len() as u64;

        let throughput_fps = if duration_secs > 0.0 {
            jobs_done as f64 / duration_secs
        } else {
            0.0
        };

        self.latencies_us.sort_unstable();
        let (min_us, max_us, avg_us) = match (self.latencies_us.first(), self.latencies_us.last()) {
            (Some(&min), Some(&max)) => {
                let sum: u64 = self.latencies_us.iter().sum();
                (min, max, sum / jobs_done)
            }
            _ => (0, 0, 0),
        };

        RunMetrics {
            jobs_done,
            jobs_failed: self.failed,
            bytes_in: self.bytes_in,
            bytes_out: self.bytes_out,
            duration_ms: duration.as_millis() as u64,
            throughput_fps,
            latency_min_us: min_us,
            latency_max_us: max_us,
            latency_avg_us: avg_us,
            latency_p50_us: self.percentile(50.0),
            latency_p95_us: self.percentile(95.0),
            latency_p99_us: self.percentile(99.0),
        }
    }

    /// Percentile of the sorted latencies
    fn percentile(&self, p: f64) -> u64 {
        if self.latencies_us.is_empty() {
            return 0;
        }

        let len = self.latencies_us.len();
        let idx = ((p / 100.0) * (len - 1) as f64).round() as usize;
        self.latencies_us[idx.min(len - 1)]
    }

    pub fn print_text(&mut self) {
        let metrics = self.finalize();
        println!("\n=== Run Metrics ===");
        println!("Jobs done:         {}", metrics.jobs_done);
        println!("Jobs failed:       {}", metrics.jobs_failed);
        println!("Bytes in:          {}", metrics.bytes_in);
        println!(
            "Bytes out:         {} ({:.2} MB)",
            metrics.bytes_out,
            metrics.bytes_out as f64 / 1_048_576.0
        );
        println!(
            "Duration:          {:.2} s",
            metrics.duration_ms as f64 / 1000.0
        );
        println!("Throughput:        {:.2} fps", metrics.throughput_fps);

        if metrics.jobs_done > 0 {
            println!("\nLatency Statistics (µs):");
            println!("  Min:    {}", metrics.latency_min_us);
            println!("  Max:    {}", metrics.latency_max_us);
            println!("  Avg:    {}", metrics.latency_avg_us);
            println!("  P50:    {}", metrics.latency_p50_us);
            println!("  P95:    {}", metrics.latency_p95_us);
            println!("  P99:    {}", metrics.latency_p99_us);
        }
    }

    pub fn print_json(&mut self) -> Result<(), serde_json::Error> {
        let metrics = self.finalize();
        let json = serde_json::to_string_pretty(&metrics)?;
        println!("{}", json);
        Ok(())
    }
}

impl Default for JobMetrics {
    fn default() -> Self {
        Self::new()
    }
}
