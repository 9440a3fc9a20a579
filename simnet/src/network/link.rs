use crate::network::spec::NetworkLinkSpec;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One direction of a point-to-point segment
///
/// Sending is paced at the link's bandwidth: a datagram starts serializing
/// when the previous one is done, and arrives at the far end after
/// serialization plus propagation delay. Datagrams that would push the
/// serialization backlog beyond the queue bound are tail-dropped.
pub struct DirectedLink {
    pub(crate) id: Arc<str>,
    pub(crate) source: IpAddr,
    pub(crate) target: IpAddr,
    pub(crate) packet_loss_ratio: f64,
    delay: Duration,
    bandwidth_bps: u64,
    queue_bytes: usize,
    busy_until: Mutex<Option<Instant>>,
}

impl DirectedLink {
    pub(crate) fn new(spec: NetworkLinkSpec) -> Self {
        Self {
            id: spec.id.into(),
            source: spec.source,
            target: spec.target,
            packet_loss_ratio: spec.packet_loss_ratio,
            delay: spec.delay,
            bandwidth_bps: spec.bandwidth_bps,
            queue_bytes: spec.queue_bytes,
            busy_until: Mutex::new(None),
        }
    }

    /// Books the datagram onto the link, returning the instant it arrives at
    /// the far end, or `None` when the transmit queue is full.
    pub(crate) fn schedule(&self, now: Instant, size_bytes: usize) -> Option<Instant> {
        let mut busy_until = self.busy_until.lock();

        let send_start = match *busy_until {
            Some(busy) if busy > now => busy,
            _ => now,
        };

        let backlog = send_start.saturating_duration_since(now);
        let backlog_bytes = (backlog.as_secs_f64() * self.bandwidth_bps as f64 / 8.0) as usize;
        if backlog_bytes + size_bytes > self.queue_bytes {
            return None;
        }

        let serialization =
            Duration::from_secs_f64(size_bytes as f64 * 8.0 / self.bandwidth_bps as f64);
        let send_done = send_start + serialization;
        *busy_until = Some(send_done);

        Some(send_done + self.delay)
    }
}
