//! Local UDP port forwarding through the tunnel
//!
//! Binds a local UDP socket and relays datagrams between arbitrary local
//! clients and one fixed tunnel-side endpoint. Each distinct client source
//! address gets its own backend connection (a 1:1 NAT, no framing); a
//! janitor task reaps mappings that sit idle past the configured timeout.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::stack::{BoxConn, Stack};

const BUFFER_SIZE: usize = 40960;

/// Idle timeout after which a NAT entry is reaped
pub const DEFAULT_NAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Observer hooks fired as clients come and go
#[derive(Default, Clone)]
pub struct ForwardCallbacks {
    pub on_connect: Option<Arc<dyn Fn(SocketAddr) + Send + Sync>>,
    pub on_disconnect: Option<Arc<dyn Fn(SocketAddr) + Send + Sync>>,
}

struct NatEntry {
    /// Flips to true once the backend dial completed; datagrams that raced
    /// ahead of the dial wait on a subscription
    ready: watch::Sender<bool>,
    backend: Mutex<Option<WriteHalf<BoxConn>>>,
    last_active: StdMutex<Instant>,
    reader: StdMutex<Option<JoinHandle<()>>>,
}

impl NatEntry {
    fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            ready,
            backend: Mutex::new(None),
            last_active: StdMutex::new(Instant::now()),
            reader: StdMutex::new(None),
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .expect("last_active lock poisoned")
            .elapsed()
    }

    fn touch(&self) {
        *self.last_active.lock().expect("last_active lock poisoned") = Instant::now();
    }

    fn close(&self) {
        if let Some(handle) = self.reader.lock().expect("reader lock poisoned").take() {
            handle.abort();
        }
    }
}

/// One bind→remote UDP forwarding instance
pub struct UdpForwarder {
    stack: Arc<dyn Stack>,
    listener: Arc<UdpSocket>,
    remote: SocketAddr,
    timeout: Duration,
    entries: Arc<RwLock<HashMap<SocketAddr, Arc<NatEntry>>>>,
    callbacks: ForwardCallbacks,
}

impl UdpForwarder {
    /// Bind the local socket; relaying starts with [`serve`](Self::serve)
    pub async fn new(
        stack: Arc<dyn Stack>,
        bind: &str,
        remote: SocketAddr,
        timeout: Duration,
        callbacks: ForwardCallbacks,
    ) -> Result<Arc<Self>> {
        let listener = UdpSocket::bind(bind).await?;
        Ok(Arc::new(Self {
            stack,
            listener: Arc::new(listener),
            remote,
            timeout,
            entries: Arc::new(RwLock::new(HashMap::new())),
            callbacks,
        }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn active_clients(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Relay until the local socket fails
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        info!(
            "UDP port forwarding: {} -> {}",
            self.listener.local_addr()?,
            self.remote
        );
        let janitor = tokio::spawn(Arc::clone(&self).janitor());
        let result = self.accept_loop().await;
        janitor.abort();
        result
    }

    async fn accept_loop(self: &Arc<Self>) -> Result<()> {
        loop {
            let mut buf = vec![0u8; BUFFER_SIZE];
            let (n, client) = self.listener.recv_from(&mut buf).await?;
            buf.truncate(n);
            let this = Arc::clone(self);
            tokio::spawn(async move { this.handle(buf, client).await });
        }
    }

    async fn janitor(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.timeout);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the immediate first tick
        loop {
            ticker.tick().await;

            let idle: Vec<SocketAddr> = {
                let entries = self.entries.read().await;
                entries
                    .iter()
                    .filter(|(_, entry)| entry.idle_for() > self.timeout)
                    .map(|(client, _)| *client)
                    .collect()
            };
            if idle.is_empty() {
                continue;
            }

            let mut reaped = Vec::with_capacity(idle.len());
            {
                let mut entries = self.entries.write().await;
                for client in idle {
                    if let Some(entry) = entries.remove(&client) {
                        entry.close();
                        reaped.push(client);
                    }
                }
            }
            for client in reaped {
                debug!(%client, "UDP forward: idle entry reaped");
                if let Some(cb) = &self.callbacks.on_disconnect {
                    cb(client);
                }
            }
        }
    }

    async fn handle(self: Arc<Self>, datagram: Vec<u8>, client: SocketAddr) {
        let (entry, created) = {
            let mut entries = self.entries.write().await;
            match entries.get(&client) {
                Some(entry) => (Arc::clone(entry), false),
                None => {
                    let entry = Arc::new(NatEntry::new());
                    entries.insert(client, Arc::clone(&entry));
                    (entry, true)
                }
            }
        };

        if created {
            self.establish(entry, datagram, client).await;
            return;
        }

        // Wait for the creator to finish dialing; a dropped sender means the
        // entry died first and the client must resend.
        let mut ready = entry.ready.subscribe();
        if ready.wait_for(|ready| *ready).await.is_err() {
            return;
        }

        {
            let mut backend = entry.backend.lock().await;
            if let Some(conn) = backend.as_mut() {
                if let Err(e) = conn.write_all(&datagram).await {
                    warn!("UDP forward: send to backend failed: {e}");
                }
            }
        }

        // Refresh the activity stamp only once the entry enters the last
        // quarter of its timeout window, keeping the hot path read-mostly.
        if entry.idle_for() > self.timeout - self.timeout / 4 {
            entry.touch();
        }
    }

    /// First datagram from a new client: dial the backend and wire up the
    /// backend→client reader
    async fn establish(self: &Arc<Self>, entry: Arc<NatEntry>, datagram: Vec<u8>, client: SocketAddr) {
        let conn = match self.stack.dial_udp(self.remote).await {
            Ok(conn) => conn,
            // No error reaches the client; it must retry on its own.
            Err(e) => {
                debug!("UDP forward: backend dial failed: {e}");
                self.entries.write().await.remove(&client);
                // Unblock any datagram waiting on this entry; with no write
                // half stored it has nothing to send to.
                entry.ready.send_replace(true);
                return;
            }
        };
        let (read_half, mut write_half) = tokio::io::split(conn);

        if let Err(e) = write_half.write_all(&datagram).await {
            warn!("UDP forward: initial send to backend failed: {e}");
        }

        *entry.backend.lock().await = Some(write_half);
        entry.touch();
        entry.ready.send_replace(true);

        let reader = tokio::spawn(Arc::clone(self).relay_backend(read_half, entry.clone(), client));
        *entry.reader.lock().expect("reader lock poisoned") = Some(reader);

        if let Some(cb) = &self.callbacks.on_connect {
            cb(client);
        }
    }

    /// Copy backend datagrams back out the shared local socket
    async fn relay_backend(
        self: Arc<Self>,
        mut read_half: ReadHalf<BoxConn>,
        entry: Arc<NatEntry>,
        client: SocketAddr,
    ) {
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Err(e) = self.listener.send_to(&buf[..n], client).await {
                        warn!("UDP forward: send to client failed: {e}");
                    }
                }
            }
        }

        // Backend gone; drop the mapping unless the janitor already did
        let removed = {
            let mut entries = self.entries.write().await;
            match entries.get(&client) {
                Some(current) if Arc::ptr_eq(current, &entry) => {
                    entries.remove(&client);
                    true
                }
                _ => false,
            }
        };
        if removed {
            debug!(%client, "UDP forward: backend closed, entry dropped");
            if let Some(cb) = &self.callbacks.on_disconnect {
                cb(client);
            }
        }
    }
}
