//! In-memory runtime and registry doubles

use crate::runtime::{ContainerDetail, ContainerRef, ContainerRuntime, LifecycleEvent};
use crate::service::{RegistryRecord, ServiceDefinition};
use crate::{CoreError, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted container runtime.
///
/// Each call to [`ContainerRuntime::events`] plays back the next queued
/// subscription; once the queue is drained the stream stays open forever.
#[derive(Default)]
pub struct MemoryRuntime {
    containers: Mutex<BTreeMap<String, ContainerDetail>>,
    broken: Mutex<HashSet<String>>,
    unavailable: Mutex<bool>,
    subscriptions: Mutex<VecDeque<Vec<Result<LifecycleEvent>>>>,
    subscribe_count: AtomicUsize,
    inspect_count: AtomicUsize,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, container: ContainerDetail) {
        self.lock_containers().insert(container.id.clone(), container);
    }

    pub fn remove_container(&self, container_id: &str) {
        self.lock_containers().remove(container_id);
    }

    /// Make inspection of `container_id` fail while it stays listed.
    pub fn break_container(&self, container_id: &str) {
        self.broken
            .lock()
            .expect("runtime lock poisoned")
            .insert(container_id.to_string());
    }

    /// Make listing fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().expect("runtime lock poisoned") = unavailable;
    }

    pub fn push_subscription(&self, events: Vec<Result<LifecycleEvent>>) {
        self.subscriptions
            .lock()
            .expect("runtime lock poisoned")
            .push_back(events);
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    pub fn inspect_count(&self) -> usize {
        self.inspect_count.load(Ordering::SeqCst)
    }

    fn lock_containers(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ContainerDetail>> {
        self.containers.lock().expect("runtime lock poisoned")
    }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn ping(&self) -> Result<()> {
        if *self.unavailable.lock().expect("runtime lock poisoned") {
            return Err(CoreError::Runtime("runtime unavailable".to_string()));
        }
        Ok(())
    }

    async fn list_running(&self) -> Result<Vec<ContainerRef>> {
        self.ping().await?;
        Ok(self
            .lock_containers()
            .values()
            .map(|c| ContainerRef {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerDetail> {
        self.inspect_count.fetch_add(1, Ordering::SeqCst);
        if self
            .broken
            .lock()
            .expect("runtime lock poisoned")
            .contains(container_id)
        {
            return Err(CoreError::Runtime(format!("cannot inspect {}", container_id)));
        }
        self.lock_containers()
            .get(container_id)
            .cloned()
            .ok_or_else(|| CoreError::ContainerNotFound(container_id.to_string()))
    }

    fn events(&self) -> BoxStream<'static, Result<LifecycleEvent>> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        let next = self
            .subscriptions
            .lock()
            .expect("runtime lock poisoned")
            .pop_front();
        match next {
            Some(events) => stream::iter(events).boxed(),
            None => stream::pending().boxed(),
        }
    }
}

/// In-memory service catalog with injectable failures
#[derive(Default)]
pub struct MemoryCatalog {
    records: Mutex<HashMap<String, RegistryRecord>>,
    failing_registers: Mutex<HashSet<String>>,
    failing_deregisters: Mutex<HashMap<String, u32>>,
    deregister_log: Mutex<Vec<String>>,
    unavailable: Mutex<bool>,
    register_count: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: RegistryRecord) {
        self.lock_records().insert(record.id.clone(), record);
    }

    pub fn records(&self) -> HashMap<String, RegistryRecord> {
        self.lock_records().clone()
    }

    pub fn fail_register(&self, service_id: &str) {
        self.failing_registers
            .lock()
            .expect("catalog lock poisoned")
            .insert(service_id.to_string());
    }

    /// Fail the next `times` deregistrations of `service_id`.
    pub fn fail_deregister(&self, service_id: &str, times: u32) {
        self.failing_deregisters
            .lock()
            .expect("catalog lock poisoned")
            .insert(service_id.to_string(), times);
    }

    /// Make listing fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().expect("catalog lock poisoned") = unavailable;
    }

    pub fn register_calls(&self) -> usize {
        self.register_count.load(Ordering::SeqCst)
    }

    pub fn deregister_calls(&self, service_id: &str) -> usize {
        self.deregister_log
            .lock()
            .expect("catalog lock poisoned")
            .iter()
            .filter(|id| *id == service_id)
            .count()
    }

    /// Ids passed to deregister, in call order.
    pub fn deregistered(&self) -> Vec<String> {
        self.deregister_log
            .lock()
            .expect("catalog lock poisoned")
            .clone()
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, HashMap<String, RegistryRecord>> {
        self.records.lock().expect("catalog lock poisoned")
    }
}

#[async_trait]
impl crate::registry::ServiceCatalog for MemoryCatalog {
    async fn ping(&self) -> Result<()> {
        if *self.unavailable.lock().expect("catalog lock poisoned") {
            return Err(CoreError::Registry("registry unavailable".to_string()));
        }
        Ok(())
    }

    async fn register(&self, service: &ServiceDefinition) -> Result<()> {
        self.register_count.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_registers
            .lock()
            .expect("catalog lock poisoned")
            .contains(&service.id)
        {
            return Err(CoreError::Registry(format!("cannot register {}", service.id)));
        }
        self.insert(service.clone().into());
        Ok(())
    }

    async fn deregister(&self, service_id: &str) -> Result<()> {
        self.deregister_log
            .lock()
            .expect("catalog lock poisoned")
            .push(service_id.to_string());

        if let Some(remaining) = self
            .failing_deregisters
            .lock()
            .expect("catalog lock poisoned")
            .get_mut(service_id)
        {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CoreError::Registry(format!("cannot deregister {}", service_id)));
            }
        }

        self.lock_records().remove(service_id);
        Ok(())
    }

    async fn services(&self) -> Result<HashMap<String, RegistryRecord>> {
        self.ping().await?;
        Ok(self.records())
    }
}
