//! Reconciliation between running containers and the service registry
//!
//! The engine keeps the registry's view of this host in line with what is
//! actually running, through two independent paths:
//!
//! - a full resync ([`ReconciliationEngine::sync_all`]) on startup and on a
//!   fixed timer, which registers every derivable service and removes owned
//!   records nothing produces anymore;
//! - lifecycle events ([`ReconciliationEngine::handle_event`]) for prompt
//!   registration on start and cleanup on stop.
//!
//! Both paths only ever remove records carrying this instance's ownership
//! tag, and both are idempotent, so they can run concurrently.

use crate::config::Config;
use crate::labels::LabelExtractor;
use crate::registry::{RegistryGateway, ServiceCatalog};
use crate::runtime::{ContainerAction, ContainerRuntime, LifecycleEvent, RuntimeGateway};
use crate::service::{short_id, RegistryRecord};
use crate::{Endpoint, Result};
use futures::stream::{BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause before resubscribing to the event stream
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Extra pause after the event stream failed with an error
pub const STREAM_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Outcome of one full resync pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Running containers seen, `None` when listing failed
    pub containers: Option<usize>,
    /// Services registered successfully
    pub registered: usize,
    /// Services whose registration failed
    pub failed: usize,
    /// Orphaned records removed
    pub orphans_removed: usize,
    /// Orphaned records that could not be removed
    pub orphans_failed: usize,
}

/// State of the event subscription
enum Subscription {
    Disconnected,
    Listening(BoxStream<'static, Result<LifecycleEvent>>),
    Backoff(Duration),
}

/// ReconciliationEngine drives registry membership from container state
pub struct ReconciliationEngine {
    runtime: RuntimeGateway,
    registry: RegistryGateway,
    extractor: LabelExtractor,
    resync_interval: Duration,
    settle_delay: Duration,
    cancel: CancellationToken,
}

impl ReconciliationEngine {
    pub fn new(
        config: &Config,
        runtime: Arc<dyn ContainerRuntime>,
        catalog: Arc<dyn ServiceCatalog>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runtime: RuntimeGateway::new(runtime),
            registry: RegistryGateway::new(catalog, config, cancel.clone()),
            extractor: LabelExtractor::new(config),
            resync_interval: config.resync_interval,
            settle_delay: config.settle_delay,
            cancel,
        }
    }

    /// Deduplicated endpoints of every service derivable right now.
    pub async fn active_endpoints(&self) -> HashSet<Endpoint> {
        let mut endpoints = HashSet::new();
        let Some(containers) = self.runtime.list_running_containers().await else {
            return endpoints;
        };

        for container in containers {
            if let Some(detail) = self.runtime.inspect(&container.id).await {
                endpoints.extend(self.extractor.extract(&detail).iter().map(|s| s.endpoint()));
            }
        }

        endpoints
    }

    /// Full resync: register every running service, then remove orphans.
    ///
    /// An orphan is a record owned by this instance whose id no running
    /// container produced in this pass. Records of containers that are
    /// running but could not be inspected are left alone, and when the
    /// container listing itself fails no orphans are removed at all.
    pub async fn sync_all(&self) -> SyncReport {
        info!("Starting full resync");
        let mut report = SyncReport::default();
        let mut active_ids = HashSet::new();
        let mut uninspected = Vec::new();

        // Phase 1: register active services
        let containers = self.runtime.list_running_containers().await;
        if let Some(containers) = &containers {
            info!("Found {} running containers", containers.len());
            report.containers = Some(containers.len());
            let mut endpoints = HashSet::new();

            for container in containers {
                let Some(detail) = self.runtime.inspect(&container.id).await else {
                    uninspected.push(short_id(&container.id).to_string());
                    continue;
                };

                for service in self.extractor.extract(&detail) {
                    active_ids.insert(service.id.clone());
                    endpoints.insert(service.endpoint());
                    if self.registry.register(&service).await {
                        report.registered += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }

            if !containers.is_empty() && endpoints.is_empty() {
                warn!("No active endpoints found among {} running containers", containers.len());
            }
        }

        // Phase 2: remove orphans
        let records = self.registry.list_all().await;
        if containers.is_none() {
            warn!("Container inventory unavailable, skipping orphan cleanup");
        } else {
            let orphans = self.orphans(&records, &active_ids, &uninspected);
            if orphans.is_empty() {
                debug!("No orphaned services found");
            } else {
                info!("Found {} orphaned services", orphans.len());
            }

            for orphan in orphans {
                info!(
                    service_id = %orphan.id,
                    "Removing orphan ({}:{})",
                    orphan.address, orphan.port
                );
                if self.registry.deregister(&orphan.id).await {
                    report.orphans_removed += 1;
                } else {
                    report.orphans_failed += 1;
                }
            }
        }

        info!(
            registered = report.registered,
            failed = report.failed,
            orphans_removed = report.orphans_removed,
            orphans_failed = report.orphans_failed,
            "Full resync complete"
        );
        report
    }

    /// Owned records absent from `active_ids`, sorted by id.
    fn orphans<'a>(
        &self,
        records: &'a HashMap<String, RegistryRecord>,
        active_ids: &HashSet<String>,
        uninspected: &[String],
    ) -> Vec<&'a RegistryRecord> {
        let mut orphans: Vec<_> = records
            .iter()
            .filter(|(id, record)| {
                self.registry.owns(record)
                    && !active_ids.contains(*id)
                    && !uninspected.iter().any(|short| id.ends_with(short.as_str()))
            })
            .map(|(_, record)| record)
            .collect();
        orphans.sort_by(|a, b| a.id.cmp(&b.id));
        orphans
    }

    /// React to a single lifecycle event.
    ///
    /// Only container start/update/stop/die/destroy events do anything.
    pub async fn handle_event(&self, event: &LifecycleEvent) {
        let Some((action, container_id)) = event.container_action() else {
            return;
        };

        info!(container = %short_id(container_id), "Container event: {}", action);

        match action {
            ContainerAction::Start | ContainerAction::Update => {
                self.handle_container_start(container_id).await;
            }
            ContainerAction::Stop | ContainerAction::Die | ContainerAction::Destroy => {
                self.handle_container_stop(container_id).await;
            }
        }
    }

    /// Register the services of a container that just started.
    ///
    /// Returns the number of services registered.
    async fn handle_container_start(&self, container_id: &str) -> usize {
        tokio::select! {
            _ = self.cancel.cancelled() => return 0,
            _ = time::sleep(self.settle_delay) => {}
        }

        let Some(detail) = self.runtime.inspect(container_id).await else {
            return 0;
        };

        let mut registered = 0;
        for service in self.extractor.extract(&detail) {
            if self.registry.register(&service).await {
                registered += 1;
            }
        }
        registered
    }

    /// Remove owned records of a container that went away.
    ///
    /// Returns the number of records removed.
    async fn handle_container_stop(&self, container_id: &str) -> usize {
        let short = short_id(container_id);
        let records = self.registry.list_all().await;

        let mut ids: Vec<&String> = records
            .iter()
            .filter(|(id, record)| id.ends_with(short) && self.registry.owns(record))
            .map(|(id, _)| id)
            .collect();
        ids.sort();

        let mut removed = 0;
        for id in ids {
            if self.registry.deregister(id).await {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(container = %short, "Cleanup removed {} services", removed);
        }
        removed
    }

    /// Consume container events until shutdown, resubscribing on failure.
    ///
    /// Events are handled one at a time, each to completion before the next
    /// is read.
    pub async fn run_event_listener(&self) {
        info!("Container event listener started");
        let mut state = Subscription::Disconnected;

        loop {
            state = match state {
                Subscription::Disconnected => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    Subscription::Listening(self.runtime.subscribe())
                }
                Subscription::Listening(mut events) => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        next = events.next() => match next {
                            Some(Ok(event)) => {
                                self.handle_event(&event).await;
                                Subscription::Listening(events)
                            }
                            Some(Err(e)) => {
                                error!("Container event stream failed: {}", e);
                                Subscription::Backoff(STREAM_ERROR_BACKOFF + RECONNECT_DELAY)
                            }
                            None => {
                                warn!("Container event stream closed");
                                Subscription::Backoff(RECONNECT_DELAY)
                            }
                        },
                    }
                }
                Subscription::Backoff(delay) => {
                    debug!("Resubscribing to container events in {:?}", delay);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = time::sleep(delay) => Subscription::Disconnected,
                    }
                }
            };
        }

        info!("Container event listener stopped");
    }

    /// Run a full resync every `resync_interval` until shutdown.
    ///
    /// Ticks that fall due while a resync is still running are skipped.
    pub async fn run_resync_loop(&self) {
        info!("Resync loop started (interval {:?})", self.resync_interval);
        let mut ticker = time::interval_at(Instant::now() + self.resync_interval, self.resync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sync_all().await;
                }
            }
        }

        info!("Resync loop stopped");
    }

    /// Initial resync, then the event listener and resync loop until shutdown.
    pub async fn run(self: Arc<Self>) {
        self.sync_all().await;

        let listener = {
            let engine = self.clone();
            tokio::spawn(async move { engine.run_event_listener().await })
        };
        let resync = {
            let engine = self.clone();
            tokio::spawn(async move { engine.run_resync_loop().await })
        };

        info!("Registrar active, watching container events");

        let (listener, resync) = tokio::join!(listener, resync);
        if let Err(e) = listener {
            error!("Event listener task failed: {}", e);
        }
        if let Err(e) = resync {
            error!("Resync task failed: {}", e);
        }
    }
}
