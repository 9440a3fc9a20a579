//! Flow-level accounting
//!
//! Every datagram is classified into a flow by its 5-tuple. The recorder is
//! a cloneable handle shared with the network, which updates counters
//! synchronously as datagrams are emitted and delivered; at the end of a
//! run the table is turned into a report with derived throughput and loss.

use crate::TransportProtocol;
use anyhow::Context;
use parking_lot::Mutex;
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Identity of one unidirectional traffic flow
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    pub protocol: TransportProtocol,
    pub source: SocketAddr,
    pub destination: SocketAddr,
}

impl Display for FlowKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} -> {}", self.protocol, self.source, self.destination)
    }
}

/// Counters for one flow, updated as the simulation runs
///
/// Offsets are relative to the start of the run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub first_tx: Option<Duration>,
    pub last_tx: Option<Duration>,
    pub first_rx: Option<Duration>,
    pub last_rx: Option<Duration>,
}

impl FlowStats {
    /// Datagrams emitted but never delivered (dropped or still in transit
    /// when the run stopped). Never negative.
    pub fn lost_packets(&self) -> u64 {
        self.tx_packets.saturating_sub(self.rx_packets)
    }
}

/// Cloneable handle to the shared flow table
#[derive(Clone)]
pub struct FlowRecorder {
    inner: Arc<Mutex<RecorderInner>>,
}

struct RecorderInner {
    start: Instant,
    flows: HashMap<FlowKey, FlowStats>,
}

impl FlowRecorder {
    pub fn new(start: Instant) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecorderInner {
                start,
                flows: HashMap::new(),
            })),
        }
    }

    pub(crate) fn track_sent(&self, key: FlowKey, size_bytes: usize, now: Instant) {
        let mut inner = self.inner.lock();
        let offset = now.saturating_duration_since(inner.start);
        let stats = inner.flows.entry(key).or_default();
        stats.tx_packets += 1;
        stats.tx_bytes += size_bytes as u64;
        stats.first_tx.get_or_insert(offset);
        stats.last_tx = Some(offset);
    }

    pub(crate) fn track_received(&self, key: FlowKey, size_bytes: usize, now: Instant) {
        let mut inner = self.inner.lock();
        let offset = now.saturating_duration_since(inner.start);
        let stats = inner.flows.entry(key).or_default();
        stats.rx_packets += 1;
        stats.rx_bytes += size_bytes as u64;
        stats.first_rx.get_or_insert(offset);
        stats.last_rx = Some(offset);
    }

    /// Snapshot of the flow table, in stable key order
    pub fn collect(&self) -> BTreeMap<FlowKey, FlowStats> {
        self.inner
            .lock()
            .flows
            .iter()
            .map(|(key, stats)| (*key, stats.clone()))
            .collect()
    }

    /// Derives the per-flow summary for a run observed over `window`
    /// (the configured run duration, not wall-clock time)
    pub fn report(&self, window: Duration) -> FlowReport {
        let window_secs = window.as_secs_f64();
        let flows = self
            .collect()
            .into_iter()
            .map(|(key, stats)| FlowReportEntry {
                protocol: key.protocol,
                source: key.source,
                destination: key.destination,
                tx_packets: stats.tx_packets,
                tx_bytes: stats.tx_bytes,
                rx_packets: stats.rx_packets,
                rx_bytes: stats.rx_bytes,
                lost_packets: stats.lost_packets(),
                throughput_bps: if window_secs > 0.0 {
                    stats.rx_bytes as f64 * 8.0 / window_secs
                } else {
                    0.0
                },
                first_tx_secs: stats.first_tx.map(|d| d.as_secs_f64()),
                last_tx_secs: stats.last_tx.map(|d| d.as_secs_f64()),
                first_rx_secs: stats.first_rx.map(|d| d.as_secs_f64()),
                last_rx_secs: stats.last_rx.map(|d| d.as_secs_f64()),
            })
            .collect();

        FlowReport {
            observed_window_secs: window_secs,
            flows,
        }
    }
}

/// Structured end-of-run summary, one entry per flow that transmitted at
/// least one datagram
#[derive(Serialize, Clone, Debug)]
pub struct FlowReport {
    pub observed_window_secs: f64,
    pub flows: Vec<FlowReportEntry>,
}

impl FlowReport {
    /// Persists the report as pretty-printed JSON, overwriting any previous
    /// report at `path`
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(self).context("failed to serialize flow report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write flow report to {}", path.display()))
    }
}

#[serde_as]
#[derive(Serialize, Clone, Debug)]
pub struct FlowReportEntry {
    #[serde_as(as = "DisplayFromStr")]
    pub protocol: TransportProtocol,
    #[serde_as(as = "DisplayFromStr")]
    pub source: SocketAddr,
    #[serde_as(as = "DisplayFromStr")]
    pub destination: SocketAddr,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    pub throughput_bps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_tx_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tx_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_rx_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rx_secs: Option<f64>,
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn key(port: u16) -> FlowKey {
        FlowKey {
            protocol: TransportProtocol::Udp,
            source: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 1, 0, 1)), port),
            destination: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 1, 3, 1)), 9),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn report_derives_throughput_and_loss() {
        let start = Instant::now();
        let recorder = FlowRecorder::new(start);
        let key = key(49_152);

        for _ in 0..10 {
            recorder.track_sent(key, 500, Instant::now());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        for _ in 0..8 {
            recorder.track_received(key, 500, Instant::now());
        }

        let report = recorder.report(Duration::from_secs(10));
        assert_eq!(report.flows.len(), 1);

        let entry = &report.flows[0];
        assert_eq!(entry.tx_packets, 10);
        assert_eq!(entry.rx_packets, 8);
        assert_eq!(entry.lost_packets, 2);
        assert_eq!(entry.throughput_bps, 8.0 * 500.0 * 8.0 / 10.0);
        assert_eq!(entry.first_tx_secs, Some(0.0));
        assert_eq!(entry.first_rx_secs, Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn loss_clamps_at_zero() {
        let recorder = FlowRecorder::new(Instant::now());
        let key = key(49_153);

        // More deliveries than emissions: loss clamps at zero
        recorder.track_sent(key, 100, Instant::now());
        recorder.track_received(key, 100, Instant::now());
        recorder.track_received(key, 100, Instant::now());

        let flows = recorder.collect();
        assert_eq!(flows[&key].lost_packets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_table_reports_no_flows() {
        let recorder = FlowRecorder::new(Instant::now());
        let report = recorder.report(Duration::from_secs(10));
        assert!(report.flows.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn collect_orders_flows_stably() {
        let recorder = FlowRecorder::new(Instant::now());
        recorder.track_sent(key(49_160), 100, Instant::now());
        recorder.track_sent(key(49_155), 100, Instant::now());

        let ports: Vec<u16> = recorder
            .collect()
            .keys()
            .map(|key| key.source.port())
            .collect();
        assert_eq!(ports, vec![49_155, 49_160]);
    }
}
