use crate::{Datagram, TransportProtocol};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// Receiving endpoint for one (protocol, port) binding on a node
///
/// Created through [`SimNetwork::bind`](crate::network::SimNetwork::bind).
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct SimSocket {
    pub(crate) protocol: TransportProtocol,
    pub(crate) port: u16,
    inner: Arc<SocketInner>,
}

struct SocketInner {
    queue: Mutex<VecDeque<Datagram>>,
    notify: Notify,
}

impl SimSocket {
    pub(crate) fn new(protocol: TransportProtocol, port: u16) -> Self {
        Self {
            protocol,
            port,
            inner: Arc::new(SocketInner {
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
            }),
        }
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn deliver(&self, datagram: Datagram) {
        self.inner.queue.lock().push_back(datagram);
        self.inner.notify.notify_one();
    }

    /// Waits until the next datagram is delivered to this binding
    pub async fn recv(&self) -> Datagram {
        loop {
            if let Some(datagram) = self.inner.queue.lock().pop_front() {
                return datagram;
            }

            self.inner.notify.notified().await;
        }
    }
}
