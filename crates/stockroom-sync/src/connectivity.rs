//! Remote reachability tracking.
//!
//! Probes are consulted in order: the remote store itself, then generic HTTP
//! endpoints, then local network interfaces. The first probe with a definite
//! answer decides; when none has one the monitor reports offline.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::SyncStore;
use crate::error::Result;

const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Reachability of the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityStatus {
    Online,
    Offline,
}

impl ConnectivityStatus {
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => f.write_str("online"),
            Self::Offline => f.write_str("offline"),
        }
    }
}

/// A single probe's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Reachable,
    Unreachable,
    /// No signal either way; defer to the next probe
    Inconclusive,
}

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(&self) -> ProbeVerdict;
}

/// Authoritative probe: a trivial query against the remote store
pub struct RemoteStoreProbe {
    store: Arc<dyn SyncStore>,
}

impl RemoteStoreProbe {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReachabilityProbe for RemoteStoreProbe {
    fn name(&self) -> &'static str {
        "remote-store"
    }

    async fn probe(&self) -> ProbeVerdict {
        match self.store.ping().await {
            Ok(()) => ProbeVerdict::Reachable,
            Err(error) => {
                tracing::debug!("Remote store ping failed: {}", error);
                ProbeVerdict::Inconclusive
            }
        }
    }
}

/// Generic external reachability via HTTP `HEAD` requests
pub struct HttpProbe {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl HttpProbe {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            urls,
        })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn probe(&self) -> ProbeVerdict {
        if self.urls.is_empty() {
            return ProbeVerdict::Inconclusive;
        }
        for url in &self.urls {
            // Any HTTP response at all proves the network path works
            match self.client.head(url).send().await {
                Ok(_) => return ProbeVerdict::Reachable,
                Err(error) => tracing::debug!("Probe {} failed: {}", url, error),
            }
        }
        ProbeVerdict::Unreachable
    }
}

/// Weakest signal: a non-loopback network interface exists
pub struct InterfaceProbe;

#[async_trait]
impl ReachabilityProbe for InterfaceProbe {
    fn name(&self) -> &'static str {
        "interface"
    }

    async fn probe(&self) -> ProbeVerdict {
        match local_ip_address::local_ip() {
            Ok(address) if !address.is_loopback() => ProbeVerdict::Reachable,
            Ok(_) => ProbeVerdict::Unreachable,
            Err(error) => {
                tracing::debug!("No usable network interface: {}", error);
                ProbeVerdict::Unreachable
            }
        }
    }
}

/// Probe timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivitySettings {
    /// Per-probe timeout
    pub timeout: Duration,
    /// Extra attempts after an offline verdict
    pub retries: u32,
    /// Background check period
    pub interval: Duration,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retries: 2,
            interval: Duration::from_secs(30),
        }
    }
}

type Listener = Arc<dyn Fn(ConnectivityStatus) + Send + Sync>;

/// Registration returned by [`ConnectivityMonitor::on_status_change`].
///
/// Dropping it keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    monitor: Weak<ConnectivityMonitor>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(monitor) = self.monitor.upgrade() {
            monitor.remove_listener(self.id);
        }
    }
}

/// Tracks whether the remote store is reachable
pub struct ConnectivityMonitor {
    probes: Vec<Arc<dyn ReachabilityProbe>>,
    settings: ConnectivitySettings,
    online: AtomicBool,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener_id: AtomicU64,
    // Serializes checks so each transition is observed exactly once
    check_lock: tokio::sync::Mutex<()>,
}

impl ConnectivityMonitor {
    /// Monitor over an explicit probe chain. Starts offline until the first check.
    pub fn new(probes: Vec<Arc<dyn ReachabilityProbe>>, settings: ConnectivitySettings) -> Self {
        Self {
            probes,
            settings,
            online: AtomicBool::new(false),
            listeners: Mutex::new(HashMap::new()),
            next_listener_id: AtomicU64::new(1),
            check_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Remote store, then HTTP probes, then interface presence
    pub fn standard(
        remote: Arc<dyn SyncStore>,
        probe_urls: Vec<String>,
        settings: ConnectivitySettings,
    ) -> Result<Self> {
        let probes: Vec<Arc<dyn ReachabilityProbe>> = vec![
            Arc::new(RemoteStoreProbe::new(remote)),
            Arc::new(HttpProbe::new(probe_urls, settings.timeout)?),
            Arc::new(InterfaceProbe),
        ];
        Ok(Self::new(probes, settings))
    }

    pub const fn settings(&self) -> ConnectivitySettings {
        self.settings
    }

    pub fn status(&self) -> ConnectivityStatus {
        if self.online.load(Ordering::SeqCst) {
            ConnectivityStatus::Online
        } else {
            ConnectivityStatus::Offline
        }
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    pub fn is_offline(&self) -> bool {
        !self.is_online()
    }

    /// Run the probe chain, retrying an offline verdict, and publish the result.
    pub async fn check_connectivity(&self) -> ConnectivityStatus {
        let _guard = self.check_lock.lock().await;

        let mut status = self.probe_once().await;
        let mut attempt = 0;
        while status == ConnectivityStatus::Offline && attempt < self.settings.retries {
            attempt += 1;
            tokio::time::sleep(RETRY_DELAY).await;
            tracing::debug!("Connectivity retry {}/{}", attempt, self.settings.retries);
            status = self.probe_once().await;
        }

        self.publish(status);
        status
    }

    async fn probe_once(&self) -> ConnectivityStatus {
        for probe in &self.probes {
            let verdict = tokio::time::timeout(self.settings.timeout, probe.probe())
                .await
                .unwrap_or_else(|_| {
                    tracing::debug!("Probe {} timed out", probe.name());
                    ProbeVerdict::Inconclusive
                });
            match verdict {
                ProbeVerdict::Reachable => return ConnectivityStatus::Online,
                ProbeVerdict::Unreachable => {
                    tracing::debug!("Probe {} reports unreachable", probe.name());
                    return ConnectivityStatus::Offline;
                }
                ProbeVerdict::Inconclusive => {}
            }
        }
        ConnectivityStatus::Offline
    }

    /// Store `status`, notifying listeners when it differs from the cached one
    fn publish(&self, status: ConnectivityStatus) {
        let was_online = self.online.swap(status.is_online(), Ordering::SeqCst);
        if was_online == status.is_online() {
            return;
        }

        tracing::info!("Connectivity changed: now {}", status);
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .map(|listeners| listeners.values().cloned().collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(status);
        }
    }

    /// Register a listener called synchronously on every status transition
    pub fn on_status_change(
        self: &Arc<Self>,
        listener: impl Fn(ConnectivityStatus) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(id, Arc::new(listener));
        }
        Subscription {
            id,
            monitor: Arc::downgrade(self),
        }
    }

    fn remove_listener(&self, id: u64) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(&id);
        }
    }

    /// Check on a fixed period until the monitor is dropped.
    ///
    /// `after_check` runs with the fresh status after every check, whether or
    /// not it changed.
    pub fn spawn_periodic<F, Fut>(self: &Arc<Self>, mut after_check: F) -> JoinHandle<()>
    where
        F: FnMut(ConnectivityStatus) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let monitor = Arc::downgrade(self);
        let period = self.settings.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                let status = monitor.check_connectivity().await;
                drop(monitor);
                after_check(status).await;
            }
        })
    }
}
