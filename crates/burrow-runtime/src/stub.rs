//! In-Memory Stub VPN Subsystem
//!
//! Stand-in for the external OS registry, session control, and status
//! broadcast. Used by the integration tests and the demo CLI; a platform
//! binding replaces it in a real deployment.
//!
//! Handles record every `save`/`reload`/`remove`/`start`/`stop` invocation
//! and can be scripted to fail, so tests can assert exactly which low-level
//! calls an orchestration step performed.

use burrow_core::{
    channel::{create_status_channel, StatusEvent, StatusSender},
    ChannelConfig, HandleId, RegistryError, SettingsStore, StatusCode, StatusReceiver,
    TunnelControlError, TunnelDescriptor, TunnelHandle, TunnelRegistry,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

// ----------------------------------------------------------------------------
// Stub Subsystem
// ----------------------------------------------------------------------------

/// Bundle of the stub registry, settings store, and status broadcast.
///
/// `status_sender` is the system-wide broadcast the orchestrator subscribes
/// to; stub handles publish their transitions on it.
pub struct StubSubsystem {
    pub registry: Arc<StubRegistry>,
    pub settings: Arc<MemorySettings>,
    pub status_sender: StatusSender,
}

impl StubSubsystem {
    pub fn new() -> Self {
        // Keep one receiver alive inside the registry so publishing never
        // observes a closed channel while no orchestrator is subscribed.
        let (status_sender, keepalive) = create_status_channel(&ChannelConfig::default());
        let sender = status_sender.clone();
        let registry = Arc::new_cyclic(|self_ref: &Weak<StubRegistry>| StubRegistry {
            self_ref: self_ref.clone(),
            records: Mutex::new(Vec::new()),
            status_sender: sender,
            _keepalive: Mutex::new(keepalive),
            platform_support: Mutex::new(true),
            next_load_error: Mutex::new(None),
            load_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            session_latency: Mutex::new(None),
        });
        Self {
            registry,
            settings: Arc::new(MemorySettings::default()),
            status_sender,
        }
    }
}

impl Default for StubSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Stub Registry
// ----------------------------------------------------------------------------

/// In-memory configuration registry
pub struct StubRegistry {
    self_ref: Weak<StubRegistry>,
    records: Mutex<Vec<Arc<StubHandle>>>,
    status_sender: StatusSender,
    _keepalive: Mutex<StatusReceiver>,
    platform_support: Mutex<bool>,
    next_load_error: Mutex<Option<String>>,
    load_calls: AtomicUsize,
    create_calls: AtomicUsize,
    /// When set, started sessions reach Connected (and stopped sessions
    /// reach Disconnected) by themselves after this delay. When unset,
    /// tests drive transitions explicitly.
    session_latency: Mutex<Option<Duration>>,
}

impl StubRegistry {
    /// Seed a record directly, bypassing `create` counters
    pub fn insert(&self, descriptor: TunnelDescriptor, live: StatusCode) -> Arc<StubHandle> {
        let handle = StubHandle::new(descriptor, live, self.self_ref.clone(), self.status_sender.clone());
        self.records.lock().unwrap().push(handle.clone());
        handle
    }

    /// Make the next `load_all` fail once
    pub fn fail_next_load(&self, reason: &str) {
        *self.next_load_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn set_platform_support(&self, supported: bool) {
        *self.platform_support.lock().unwrap() = supported;
    }

    /// Enable self-driving sessions for demos
    pub fn set_session_latency(&self, latency: Duration) {
        *self.session_latency.lock().unwrap() = Some(latency);
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Current records, in insertion order
    pub fn handles(&self) -> Vec<Arc<StubHandle>> {
        self.records.lock().unwrap().clone()
    }

    fn remove_record(&self, id: HandleId) {
        self.records.lock().unwrap().retain(|h| h.id != id);
    }
}

#[async_trait::async_trait]
impl TunnelRegistry for StubRegistry {
    async fn load_all(&self) -> Result<Vec<Arc<dyn TunnelHandle>>, RegistryError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.next_load_error.lock().unwrap().take() {
            return Err(RegistryError::load(reason));
        }
        let records = self.records.lock().unwrap();
        Ok(records.iter().map(|h| h.clone() as Arc<dyn TunnelHandle>).collect())
    }

    async fn create(
        &self,
        descriptor: TunnelDescriptor,
    ) -> Result<Arc<dyn TunnelHandle>, RegistryError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let handle = StubHandle::new(
            descriptor,
            StatusCode::Invalid,
            self.self_ref.clone(),
            self.status_sender.clone(),
        );
        self.records.lock().unwrap().push(handle.clone());
        Ok(handle as Arc<dyn TunnelHandle>)
    }

    fn platform_support(&self) -> bool {
        *self.platform_support.lock().unwrap()
    }
}

// ----------------------------------------------------------------------------
// Stub Handle
// ----------------------------------------------------------------------------

/// In-memory configuration record with scripted session behaviour
pub struct StubHandle {
    self_ref: Weak<StubHandle>,
    id: HandleId,
    descriptor: Mutex<TunnelDescriptor>,
    live: Mutex<StatusCode>,
    registry: Weak<StubRegistry>,
    status_sender: StatusSender,
    save_calls: AtomicUsize,
    reload_calls: AtomicUsize,
    remove_calls: AtomicUsize,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    next_save_error: Mutex<Option<String>>,
    next_reload_error: Mutex<Option<String>>,
    next_remove_error: Mutex<Option<String>>,
    next_start_error: Mutex<Option<String>>,
    last_start_options: Mutex<Option<HashMap<String, String>>>,
}

impl StubHandle {
    fn new(
        descriptor: TunnelDescriptor,
        live: StatusCode,
        registry: Weak<StubRegistry>,
        status_sender: StatusSender,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref: &Weak<StubHandle>| StubHandle {
            self_ref: self_ref.clone(),
            id: HandleId::generate(),
            descriptor: Mutex::new(descriptor),
            live: Mutex::new(live),
            registry,
            status_sender,
            save_calls: AtomicUsize::new(0),
            reload_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            next_save_error: Mutex::new(None),
            next_reload_error: Mutex::new(None),
            next_remove_error: Mutex::new(None),
            next_start_error: Mutex::new(None),
            last_start_options: Mutex::new(None),
        })
    }

    /// Move the session to `code` and publish the change on the broadcast
    pub fn transition(&self, code: StatusCode) {
        *self.live.lock().unwrap() = code;
        let _ = self.status_sender.send(StatusEvent { code, handle_id: self.id });
    }

    fn session_latency(&self) -> Option<Duration> {
        self.registry
            .upgrade()
            .and_then(|r| *r.session_latency.lock().unwrap())
    }

    fn schedule_transition(&self, code: StatusCode, after: Duration) {
        let Some(handle) = self.self_ref.upgrade() else { return };
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            handle.transition(code);
        });
    }

    pub fn fail_next_save(&self, reason: &str) {
        *self.next_save_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn fail_next_reload(&self, reason: &str) {
        *self.next_reload_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn fail_next_remove(&self, reason: &str) {
        *self.next_remove_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn fail_next_start(&self, reason: &str) {
        *self.next_start_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn reload_calls(&self) -> usize {
        self.reload_calls.load(Ordering::SeqCst)
    }

    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Options map passed to the most recent `start_tunnel`
    pub fn last_start_options(&self) -> Option<HashMap<String, String>> {
        self.last_start_options.lock().unwrap().clone()
    }

    pub fn handle_id(&self) -> HandleId {
        self.id
    }
}

#[async_trait::async_trait]
impl TunnelHandle for StubHandle {
    fn id(&self) -> HandleId {
        self.id
    }

    fn descriptor(&self) -> TunnelDescriptor {
        self.descriptor.lock().unwrap().clone()
    }

    async fn save(&self, descriptor: &TunnelDescriptor) -> Result<(), RegistryError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.next_save_error.lock().unwrap().take() {
            return Err(RegistryError::save(reason));
        }
        *self.descriptor.lock().unwrap() = descriptor.clone();
        Ok(())
    }

    async fn reload(&self) -> Result<(), RegistryError> {
        self.reload_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.next_reload_error.lock().unwrap().take() {
            return Err(RegistryError::reload(reason));
        }
        Ok(())
    }

    async fn remove(&self) -> Result<(), RegistryError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.next_remove_error.lock().unwrap().take() {
            return Err(RegistryError::remove(reason));
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_record(self.id);
        }
        Ok(())
    }

    fn live_status(&self) -> StatusCode {
        *self.live.lock().unwrap()
    }

    fn start_tunnel(&self, options: &HashMap<String, String>) -> Result<(), TunnelControlError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.next_start_error.lock().unwrap().take() {
            return Err(TunnelControlError::StartFailed { reason });
        }
        *self.last_start_options.lock().unwrap() = Some(options.clone());
        self.transition(StatusCode::Connecting);
        if let Some(latency) = self.session_latency() {
            self.schedule_transition(StatusCode::Connected, latency);
        }
        Ok(())
    }

    fn stop_tunnel(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.transition(StatusCode::Disconnecting);
        if let Some(latency) = self.session_latency() {
            self.schedule_transition(StatusCode::Disconnected, latency);
        }
    }
}

// ----------------------------------------------------------------------------
// Memory Settings
// ----------------------------------------------------------------------------

/// In-memory key-value settings store
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl SettingsStore for MemorySettings {
    fn string(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set_string(&self, key: &str, value: &str) {
        self.values.lock().unwrap().insert(key.to_string(), value.to_string());
    }

    fn flag(&self, key: &str) -> bool {
        self.values
            .lock()
            .unwrap()
            .get(key)
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    fn set_flag(&self, key: &str, value: bool) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), if value { "true" } else { "false" }.to_string());
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> TunnelDescriptor {
        TunnelDescriptor::new_enabled("net.example.burrow", "Burrow", "10.25.0.0/16")
    }

    #[tokio::test]
    async fn load_all_returns_seeded_records() {
        let stub = StubSubsystem::new();
        stub.registry.insert(descriptor(), StatusCode::Disconnected);
        let all = stub.registry.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(stub.registry.load_calls(), 1);
    }

    #[tokio::test]
    async fn scripted_load_failure_fires_once() {
        let stub = StubSubsystem::new();
        stub.registry.fail_next_load("registry unavailable");
        assert!(stub.registry.load_all().await.is_err());
        assert!(stub.registry.load_all().await.is_ok());
    }

    #[tokio::test]
    async fn transitions_reach_the_broadcast() {
        let stub = StubSubsystem::new();
        let handle = stub.registry.insert(descriptor(), StatusCode::Disconnected);
        let mut receiver = stub.status_sender.subscribe();

        handle.transition(StatusCode::Connecting);
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.code, StatusCode::Connecting);
        assert_eq!(event.handle_id, handle.handle_id());
    }

    #[tokio::test]
    async fn start_records_options_and_goes_connecting() {
        let stub = StubSubsystem::new();
        let handle = stub.registry.insert(descriptor(), StatusCode::Disconnected);
        let mut options = HashMap::new();
        options.insert("TunnelDeviceIP".to_string(), "10.25.0.2".to_string());

        handle.start_tunnel(&options).unwrap();
        assert_eq!(handle.start_calls(), 1);
        assert_eq!(handle.live_status(), StatusCode::Connecting);
        assert_eq!(
            handle.last_start_options().unwrap().get("TunnelDeviceIP"),
            Some(&"10.25.0.2".to_string())
        );
    }

    #[tokio::test]
    async fn remove_deletes_the_record() {
        let stub = StubSubsystem::new();
        let handle = stub.registry.insert(descriptor(), StatusCode::Disconnected);
        TunnelHandle::remove(&*handle).await.unwrap();
        assert_eq!(stub.registry.record_count(), 0);
    }

    #[tokio::test]
    async fn self_driving_session_reaches_connected() {
        let stub = StubSubsystem::new();
        stub.registry.set_session_latency(Duration::from_millis(5));
        let handle = stub.registry.insert(descriptor(), StatusCode::Disconnected);

        handle.start_tunnel(&HashMap::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.live_status(), StatusCode::Connected);
    }

    #[test]
    fn memory_settings_flag_defaults_false() {
        let settings = MemorySettings::default();
        assert!(!settings.flag("missing"));
        settings.set_flag("missing", true);
        assert!(settings.flag("missing"));
    }
}
