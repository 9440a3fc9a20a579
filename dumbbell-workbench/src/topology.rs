//! Dumbbell topology construction
//!
//! Two groups of edge hosts, each attached to its own router, with the two
//! routers joined by a single bottleneck segment. Construction is pure: it
//! never touches the simulation clock.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Per-segment link parameters
#[derive(Clone, Copy, Debug)]
pub struct LinkParams {
    pub bandwidth_bps: u64,
    pub delay: Duration,
    /// Transmit queue bound per direction, in bytes
    pub queue_bytes: usize,
    /// Ratio of packets lost in transit (between 0 and 1)
    pub packet_loss_ratio: f64,
}

/// A point-to-point segment between exactly two nodes
#[derive(Clone, Debug)]
pub struct LinkSegment {
    pub id: Arc<str>,
    /// First endpoint; receives `.1` once addressed
    pub a: Arc<str>,
    /// Second endpoint; receives `.2` once addressed
    pub b: Arc<str>,
    pub params: LinkParams,
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("segment endpoint refers to an unknown node: {0}")]
    UnknownNode(Arc<str>),
    #[error("duplicate segment between {a} and {b}")]
    DuplicateSegment { a: Arc<str>, b: Arc<str> },
}

/// A built dumbbell
///
/// `segments` is ordered for the address planner: left access segments in
/// host order, the bottleneck, then right access segments in host order.
#[derive(Clone, Debug)]
pub struct Dumbbell {
    left_hosts: Vec<Arc<str>>,
    right_hosts: Vec<Arc<str>>,
    left_router: Arc<str>,
    right_router: Arc<str>,
    segments: Vec<LinkSegment>,
}

impl Dumbbell {
    pub fn left_hosts(&self) -> &[Arc<str>] {
        &self.left_hosts
    }

    pub fn right_hosts(&self) -> &[Arc<str>] {
        &self.right_hosts
    }

    pub fn left_router(&self) -> &Arc<str> {
        &self.left_router
    }

    pub fn right_router(&self) -> &Arc<str> {
        &self.right_router
    }

    pub fn segments(&self) -> &[LinkSegment] {
        &self.segments
    }

    /// The single segment joining the two routers
    pub fn bottleneck(&self) -> &LinkSegment {
        &self.segments[self.left_hosts.len()]
    }

    pub fn is_router(&self, node: &str) -> bool {
        *self.left_router == *node || *self.right_router == *node
    }
}

/// Builds dumbbells of any (possibly degenerate) group size
pub struct TopologyBuilder {
    left_count: usize,
    right_count: usize,
    left_params: LinkParams,
    right_params: LinkParams,
    bottleneck_params: LinkParams,
}

impl TopologyBuilder {
    pub fn new(
        left_count: usize,
        right_count: usize,
        left_params: LinkParams,
        right_params: LinkParams,
        bottleneck_params: LinkParams,
    ) -> Self {
        Self {
            left_count,
            right_count,
            left_params,
            right_params,
            bottleneck_params,
        }
    }

    pub fn build(&self) -> Result<Dumbbell, TopologyError> {
        let left_router: Arc<str> = Arc::from("left-router");
        let right_router: Arc<str> = Arc::from("right-router");
        let left_hosts: Vec<Arc<str>> = (0..self.left_count)
            .map(|i| Arc::from(format!("left-{i}").into_boxed_str()))
            .collect();
        let right_hosts: Vec<Arc<str>> = (0..self.right_count)
            .map(|i| Arc::from(format!("right-{i}").into_boxed_str()))
            .collect();

        let mut graph = SegmentGraph::default();
        for node in left_hosts
            .iter()
            .chain([&left_router, &right_router])
            .chain(right_hosts.iter())
        {
            graph.add_node(node.clone());
        }

        for host in &left_hosts {
            graph.connect(host, &left_router, self.left_params)?;
        }
        graph.connect(&left_router, &right_router, self.bottleneck_params)?;
        for host in &right_hosts {
            graph.connect(host, &right_router, self.right_params)?;
        }

        Ok(Dumbbell {
            left_hosts,
            right_hosts,
            left_router,
            right_router,
            segments: graph.segments,
        })
    }
}

/// Guarded segment insertion: endpoints must be known nodes, and at most
/// one segment may exist between any pair
#[derive(Default)]
struct SegmentGraph {
    nodes: HashSet<Arc<str>>,
    connected: HashSet<(Arc<str>, Arc<str>)>,
    segments: Vec<LinkSegment>,
}

impl SegmentGraph {
    fn add_node(&mut self, id: Arc<str>) {
        self.nodes.insert(id);
    }

    fn connect(
        &mut self,
        a: &Arc<str>,
        b: &Arc<str>,
        params: LinkParams,
    ) -> Result<(), TopologyError> {
        for endpoint in [a, b] {
            if !self.nodes.contains(endpoint) {
                return Err(TopologyError::UnknownNode(endpoint.clone()));
            }
        }

        let pair = if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        if !self.connected.insert(pair) {
            return Err(TopologyError::DuplicateSegment {
                a: a.clone(),
                b: b.clone(),
            });
        }

        self.segments.push(LinkSegment {
            id: Arc::from(format!("{a}-{b}").into_boxed_str()),
            a: a.clone(),
            b: b.clone(),
            params,
        });
        Ok(())
    }
}
