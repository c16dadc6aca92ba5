//! A process-wide, simulated radio environment used by tests and the
//! demo binary to model several endpoints discovering each other over
//! BLE/Bluetooth classic/Wi-Fi LAN/WebRTC without any real hardware.
//!
//! All registry mutation is serialized onto one dedicated task that
//! drains an `mpsc` queue of boxed closures — the async analogue of
//! the single dedicated worker thread spec.md's C++ origin used, and
//! [`OnceLock`] stands in for its function-local-static singleton.
//! Registration and state-change methods mirror
//! `MediumEnvironment::Register*`/`Update*ForAdvertising`/
//! `Update*ForDiscovery` from the original implementation: a medium
//! registers a discovery callback, another medium's state change (its
//! adapter turning discoverable, starting BLE/Wi-Fi LAN advertising)
//! enumerates every *other* registered medium and invokes its
//! callback, skipping the medium that caused the change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info};

/// Opaque handle identifying one registered medium instance. Stands in
/// for the C++ source's raw `api::*Medium*` pointers, which this crate
/// has no equivalent concrete type for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediumId(u64);

#[derive(Debug, Clone)]
pub struct WifiLanServiceInfo {
    pub ip_address: String,
    pub port: u16,
}

/// Callbacks a registered Bluetooth classic medium receives when
/// another medium's adapter changes state. Mirrors
/// `BluetoothDiscoveryCallback` (`device_discovered_cb`/
/// `device_name_changed_cb`/`device_lost_cb`).
pub struct BluetoothDiscoveryCallback {
    pub on_device_discovered: Box<dyn Fn(MediumId, &str) + Send>,
    pub on_device_name_changed: Box<dyn Fn(MediumId, &str) + Send>,
    pub on_device_lost: Box<dyn Fn(MediumId) + Send>,
}

/// Callbacks a registered BLE medium receives when another medium
/// starts/stops advertising. Mirrors `BleDiscoveredPeripheralCallback`.
pub struct BleDiscoveryCallback {
    pub on_peripheral_discovered: Box<dyn Fn(MediumId, &str, bool) + Send>,
    pub on_peripheral_lost: Box<dyn Fn(MediumId, &str) + Send>,
}

/// Callbacks a registered Wi-Fi LAN (v1) medium receives for one
/// `service_id` when another medium starts/stops advertising it.
/// Mirrors `WifiLanDiscoveredServiceCallback`.
pub struct WifiLanDiscoveryCallback {
    pub on_service_discovered: Box<dyn Fn(MediumId, &str) + Send>,
    pub on_service_lost: Box<dyn Fn(MediumId, &str) + Send>,
}

struct BluetoothMediumContext {
    discovery_callback: Option<BluetoothDiscoveryCallback>,
    /// Devices this medium has already reported, so a repeat
    /// notification with the same name is re-delivered as
    /// "discovered" rather than spuriously renamed.
    devices: HashMap<MediumId, String>,
}

struct BleMediumContext {
    discovery_callback: Option<BleDiscoveryCallback>,
    advertising: bool,
    fast_advertisement: bool,
}

struct WifiLanServiceIdContext {
    advertising: bool,
    discovery_callback: Option<WifiLanDiscoveryCallback>,
}

#[derive(Default)]
struct WifiLanMediumContext {
    services: HashMap<String, WifiLanServiceIdContext>,
}

#[derive(Default)]
struct EnvironmentState {
    bluetooth_mediums: HashMap<MediumId, BluetoothMediumContext>,
    ble_mediums: HashMap<MediumId, BleMediumContext>,
    wifi_lan_mediums: HashMap<MediumId, WifiLanMediumContext>,
    wifi_lan_services: HashMap<MediumId, WifiLanServiceInfo>,
    wifi_lan_mediums_v2: HashMap<MediumId, HashMap<String, WifiLanServiceInfo>>,
    webrtc_message_callbacks: HashMap<String, Box<dyn Fn(Bytes) + Send>>,
    webrtc_complete_callbacks: HashMap<String, Box<dyn Fn(bool) + Send>>,
    use_valid_peer_connection: bool,
    peer_connection_latency: Duration,
}

impl EnvironmentState {
    fn reset(&mut self) {
        self.bluetooth_mediums.clear();
        self.ble_mediums.clear();
        self.wifi_lan_mediums.clear();
        self.wifi_lan_services.clear();
        self.wifi_lan_mediums_v2.clear();
        self.webrtc_message_callbacks.clear();
        self.webrtc_complete_callbacks.clear();
        self.use_valid_peer_connection = true;
        self.peer_connection_latency = Duration::ZERO;
    }
}

type Job = Box<dyn FnOnce(&mut EnvironmentState) + Send>;

/// Process-wide simulated medium environment. Obtain the single
/// instance with [`MediumEnvironment::instance`].
pub struct MediumEnvironment {
    enabled: AtomicBool,
    job_count: Arc<AtomicU64>,
    next_id: AtomicU64,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
}

static INSTANCE: OnceLock<MediumEnvironment> = OnceLock::new();

impl MediumEnvironment {
    pub fn instance() -> &'static MediumEnvironment {
        INSTANCE.get_or_init(|| MediumEnvironment {
            enabled: AtomicBool::new(false),
            job_count: Arc::new(AtomicU64::new(0)),
            next_id: AtomicU64::new(1),
            sender: Mutex::new(None),
        })
    }

    /// Starts the worker task and resets every registry. Idempotent:
    /// a second `start()` while already running is a no-op.
    pub async fn start(&self) {
        if self.enabled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("MediumEnvironment::start");
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        *self.sender.lock().await = Some(tx);
        let job_count = self.job_count.clone();
        tokio::spawn(async move {
            let mut state = EnvironmentState::default();
            while let Some(job) = rx.recv().await {
                job(&mut state);
                job_count.fetch_add(1, Ordering::SeqCst);
            }
        });
        self.reset().await;
    }

    /// Stops the environment, syncing first so no job is left pending.
    pub async fn stop(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            info!("MediumEnvironment::stop");
            self.sync(false).await;
            *self.sender.lock().await = None;
        }
    }

    /// Clears every registry and restores the default globals.
    pub async fn reset(&self) {
        self.run(|state| state.reset()).await;
        self.sync(true).await;
    }

    /// Posts a job and waits for it to run, returning only once every
    /// job enqueued before it (and any it transitively triggers) has
    /// also completed — the same repeat-until-quiescent loop as the
    /// C++ origin's `Sync()`.
    pub async fn sync(&self, enable_notifications: bool) {
        debug!(enable_notifications, "MediumEnvironment::sync");
        loop {
            let count_before = self.job_count.load(Ordering::SeqCst) + 1;
            let (tx, rx) = oneshot::channel();
            self.run(move |_state| {
                let _ = tx.send(());
            })
            .await;
            let _ = rx.await;
            if count_before >= self.job_count.load(Ordering::SeqCst) {
                break;
            }
        }
        debug!("MediumEnvironment::sync done");
    }

    async fn run(&self, job: impl FnOnce(&mut EnvironmentState) + Send + 'static) {
        let guard = self.sender.lock().await;
        if let Some(sender) = guard.as_ref() {
            let _ = sender.send(Box::new(job));
        }
    }

    fn allocate_id(&self) -> MediumId {
        MediumId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    // ---- Bluetooth classic ------------------------------------------------

    pub async fn register_bluetooth_medium(
        &self,
        discovery_callback: Option<BluetoothDiscoveryCallback>,
    ) -> MediumId {
        let id = self.allocate_id();
        self.run(move |state| {
            state.bluetooth_mediums.insert(
                id,
                BluetoothMediumContext {
                    discovery_callback,
                    devices: HashMap::new(),
                },
            );
        })
        .await;
        id
    }

    pub async fn unregister_bluetooth_medium(&self, id: MediumId) {
        self.run(move |state| {
            state.bluetooth_mediums.remove(&id);
        })
        .await;
    }

    /// Reports `device`'s adapter state, e.g. "an adapter just became
    /// discoverable with this name". Notifies every *other* registered
    /// Bluetooth medium's discovery callback: a brand-new device is
    /// `discovered`, a known device whose name changed is
    /// `name_changed` (same name re-reports as `discovered`), and a
    /// device that went non-discoverable/disabled is `lost`.
    pub async fn on_bluetooth_adapter_state_changed(
        &self,
        owner: MediumId,
        device: MediumId,
        name: impl Into<String>,
        discoverable: bool,
        enabled: bool,
    ) {
        let name = name.into();
        self.run(move |state| {
            let other_ids: Vec<MediumId> = state
                .bluetooth_mediums
                .keys()
                .copied()
                .filter(|id| *id != owner)
                .collect();
            for id in other_ids {
                let Some(ctx) = state.bluetooth_mediums.get_mut(&id) else {
                    continue;
                };
                match ctx.devices.get(&device).cloned() {
                    None => {
                        if discoverable && enabled {
                            ctx.devices.insert(device, name.clone());
                            if let Some(cb) = &ctx.discovery_callback {
                                (cb.on_device_discovered)(device, &name);
                            }
                        }
                    }
                    Some(known_name) => {
                        if discoverable && enabled {
                            if known_name != name {
                                ctx.devices.insert(device, name.clone());
                                if let Some(cb) = &ctx.discovery_callback {
                                    (cb.on_device_name_changed)(device, &name);
                                }
                            } else if let Some(cb) = &ctx.discovery_callback {
                                (cb.on_device_discovered)(device, &name);
                            }
                        }
                        if !enabled {
                            ctx.devices.remove(&device);
                            if let Some(cb) = &ctx.discovery_callback {
                                (cb.on_device_lost)(device);
                            }
                        }
                    }
                }
            }
        })
        .await;
    }

    // ---- BLE ---------------------------------------------------------

    pub async fn register_ble_medium(&self) -> MediumId {
        let id = self.allocate_id();
        self.run(move |state| {
            state.ble_mediums.insert(
                id,
                BleMediumContext {
                    discovery_callback: None,
                    advertising: false,
                    fast_advertisement: false,
                },
            );
        })
        .await;
        id
    }

    pub async fn unregister_ble_medium(&self, id: MediumId) {
        self.run(move |state| {
            state.ble_mediums.remove(&id);
        })
        .await;
    }

    /// Starts or stops `medium` advertising `peripheral` under
    /// `service_id`, notifying every other BLE medium's discovery
    /// callback immediately.
    pub async fn update_ble_medium_for_advertising(
        &self,
        medium: MediumId,
        peripheral: MediumId,
        service_id: impl Into<String>,
        fast_advertisement: bool,
        enabled: bool,
    ) {
        let service_id = service_id.into();
        self.run(move |state| {
            if let Some(ctx) = state.ble_mediums.get_mut(&medium) {
                ctx.advertising = enabled;
                ctx.fast_advertisement = fast_advertisement;
            } else {
                return;
            }
            let other_ids: Vec<MediumId> = state
                .ble_mediums
                .keys()
                .copied()
                .filter(|id| *id != medium)
                .collect();
            for id in other_ids {
                if let Some(ctx) = state.ble_mediums.get(&id) {
                    if let Some(cb) = &ctx.discovery_callback {
                        if enabled {
                            (cb.on_peripheral_discovered)(
                                peripheral,
                                &service_id,
                                fast_advertisement,
                            );
                        } else {
                            (cb.on_peripheral_lost)(peripheral, &service_id);
                        }
                    }
                }
            }
        })
        .await;
    }

    /// Starts or stops `medium` scanning for `service_id`. While
    /// `enabled`, every currently-advertising BLE medium is reported
    /// to the new scanner immediately, matching the original's
    /// "replay current state to a newly registered scanner" behaviour.
    pub async fn update_ble_medium_for_scanning(
        &self,
        medium: MediumId,
        service_id: impl Into<String>,
        discovery_callback: Option<BleDiscoveryCallback>,
        enabled: bool,
    ) {
        let service_id = service_id.into();
        self.run(move |state| {
            if let Some(ctx) = state.ble_mediums.get_mut(&medium) {
                ctx.discovery_callback = discovery_callback;
            } else {
                return;
            }
            if !enabled {
                return;
            }
            let advertisers: Vec<(MediumId, bool)> = state
                .ble_mediums
                .iter()
                .filter(|(id, ctx)| **id != medium && ctx.advertising)
                .map(|(id, ctx)| (*id, ctx.fast_advertisement))
                .collect();
            if let Some(ctx) = state.ble_mediums.get(&medium) {
                if let Some(cb) = &ctx.discovery_callback {
                    for (peripheral, fast_advertisement) in advertisers {
                        (cb.on_peripheral_discovered)(
                            peripheral,
                            &service_id,
                            fast_advertisement,
                        );
                    }
                }
            }
        })
        .await;
    }

    // ---- Wi-Fi LAN (v1): per-medium service discovery ------------------

    pub async fn register_wifi_lan_medium(&self) -> MediumId {
        let id = self.allocate_id();
        self.run(move |state| {
            state
                .wifi_lan_mediums
                .insert(id, WifiLanMediumContext::default());
        })
        .await;
        id
    }

    pub async fn unregister_wifi_lan_medium(&self, id: MediumId) {
        self.run(move |state| {
            state.wifi_lan_mediums.remove(&id);
        })
        .await;
    }

    /// Starts or stops `medium` advertising `service_id`, notifying
    /// every other Wi-Fi LAN medium already discovering that id.
    pub async fn update_wifi_lan_medium_for_advertising(
        &self,
        medium: MediumId,
        service: MediumId,
        service_id: impl Into<String>,
        enabled: bool,
    ) {
        let service_id = service_id.into();
        self.run(move |state| {
            if let Some(ctx) = state.wifi_lan_mediums.get_mut(&medium) {
                ctx.services
                    .entry(service_id.clone())
                    .or_insert_with(|| WifiLanServiceIdContext {
                        advertising: false,
                        discovery_callback: None,
                    })
                    .advertising = enabled;
            } else {
                return;
            }
            let other_ids: Vec<MediumId> = state
                .wifi_lan_mediums
                .keys()
                .copied()
                .filter(|id| *id != medium)
                .collect();
            for id in other_ids {
                if let Some(ctx) = state.wifi_lan_mediums.get(&id) {
                    if let Some(id_ctx) = ctx.services.get(&service_id) {
                        if let Some(cb) = &id_ctx.discovery_callback {
                            if enabled {
                                (cb.on_service_discovered)(service, &service_id);
                            } else {
                                (cb.on_service_lost)(service, &service_id);
                            }
                        }
                    }
                }
            }
        })
        .await;
    }

    /// Starts or stops `medium` discovering `service_id`. While
    /// `enabled`, any other medium already advertising that id is
    /// reported to the new discoverer immediately.
    pub async fn update_wifi_lan_medium_for_discovery(
        &self,
        medium: MediumId,
        service_id: impl Into<String>,
        discovery_callback: Option<WifiLanDiscoveryCallback>,
        enabled: bool,
    ) {
        let service_id = service_id.into();
        self.run(move |state| {
            if let Some(ctx) = state.wifi_lan_mediums.get_mut(&medium) {
                ctx.services
                    .entry(service_id.clone())
                    .or_insert_with(|| WifiLanServiceIdContext {
                        advertising: false,
                        discovery_callback: None,
                    })
                    .discovery_callback = discovery_callback;
            } else {
                return;
            }
            if !enabled {
                return;
            }
            let advertisers: Vec<MediumId> = state
                .wifi_lan_mediums
                .iter()
                .filter(|(id, ctx)| {
                    **id != medium
                        && ctx
                            .services
                            .get(&service_id)
                            .map(|s| s.advertising)
                            .unwrap_or(false)
                })
                .map(|(id, _)| *id)
                .collect();
            if let Some(id_ctx) = state
                .wifi_lan_mediums
                .get(&medium)
                .and_then(|ctx| ctx.services.get(&service_id))
            {
                if let Some(cb) = &id_ctx.discovery_callback {
                    for advertiser in advertisers {
                        (cb.on_service_discovered)(advertiser, &service_id);
                    }
                }
            }
        })
        .await;
    }

    // ---- Wi-Fi LAN service address registry (GetWifiLanService) -------

    /// Registers a Wi-Fi LAN service advertising at `ip`:`port`.
    pub async fn register_wifi_lan_service(&self, ip_address: impl Into<String>, port: u16) -> MediumId {
        let id = self.allocate_id();
        let ip_address = ip_address.into();
        self.run(move |state| {
            state
                .wifi_lan_services
                .insert(id, WifiLanServiceInfo { ip_address, port });
        })
        .await;
        id
    }

    pub async fn unregister_wifi_lan_service(&self, id: MediumId) {
        self.run(move |state| {
            state.wifi_lan_services.remove(&id);
        })
        .await;
    }

    /// Looks up a registered Wi-Fi LAN service by address/port.
    ///
    /// The original implementation dereferenced its output parameter
    /// before ever assigning it, always reading the advertised
    /// service's own address back at itself (spec.md §9's open
    /// question). This walks the registry's stored services instead —
    /// the address/port being searched for is the lookup key, never a
    /// not-yet-initialized local.
    pub async fn get_wifi_lan_service(&self, ip_address: &str, port: u16) -> Option<MediumId> {
        let (tx, rx) = oneshot::channel();
        let ip_address = ip_address.to_string();
        self.run(move |state| {
            let found = state
                .wifi_lan_services
                .iter()
                .find(|(_, info)| info.ip_address == ip_address && info.port == port)
                .map(|(id, _)| *id);
            let _ = tx.send(found);
        })
        .await;
        rx.await.unwrap_or(None)
    }

    // ---- Wi-Fi LAN v2 ---------------------------------------------------

    pub async fn register_wifi_lan_medium_v2(&self) -> MediumId {
        let id = self.allocate_id();
        self.run(move |state| {
            state.wifi_lan_mediums_v2.insert(id, HashMap::new());
        })
        .await;
        id
    }

    pub async fn unregister_wifi_lan_medium_v2(&self, id: MediumId) {
        self.run(move |state| {
            state.wifi_lan_mediums_v2.remove(&id);
        })
        .await;
    }

    pub async fn start_advertising_v2(
        &self,
        medium: MediumId,
        service_type: impl Into<String>,
        info: WifiLanServiceInfo,
    ) {
        let service_type = service_type.into();
        self.run(move |state| {
            if let Some(services) = state.wifi_lan_mediums_v2.get_mut(&medium) {
                services.insert(service_type, info);
            }
        })
        .await;
    }

    pub async fn stop_advertising_v2(&self, medium: MediumId, service_type: &str) {
        let service_type = service_type.to_string();
        self.run(move |state| {
            if let Some(services) = state.wifi_lan_mediums_v2.get_mut(&medium) {
                services.remove(&service_type);
            }
        })
        .await;
    }

    // ---- WebRTC signaling ------------------------------------------------

    pub async fn register_webrtc_signaling(
        &self,
        peer_id: impl Into<String>,
        on_message: Box<dyn Fn(Bytes) + Send>,
        on_complete: Box<dyn Fn(bool) + Send>,
    ) {
        let peer_id = peer_id.into();
        self.run(move |state| {
            state.webrtc_message_callbacks.insert(peer_id.clone(), on_message);
            state.webrtc_complete_callbacks.insert(peer_id, on_complete);
        })
        .await;
    }

    pub async fn unregister_webrtc_signaling(&self, peer_id: &str) {
        let peer_id = peer_id.to_string();
        self.run(move |state| {
            state.webrtc_message_callbacks.remove(&peer_id);
            state.webrtc_complete_callbacks.remove(&peer_id);
        })
        .await;
    }

    pub async fn send_webrtc_signaling_message(&self, peer_id: &str, message: Bytes) {
        let peer_id = peer_id.to_string();
        self.run(move |state| {
            if let Some(cb) = state.webrtc_message_callbacks.get(&peer_id) {
                cb(message);
            }
        })
        .await;
    }

    pub async fn send_webrtc_signaling_complete(&self, peer_id: &str, success: bool) {
        let peer_id = peer_id.to_string();
        self.run(move |state| {
            if let Some(cb) = state.webrtc_complete_callbacks.get(&peer_id) {
                cb(success);
            }
        })
        .await;
    }

    // ---- Globals ----------------------------------------------------------

    pub async fn set_use_valid_peer_connection(&self, valid: bool) {
        self.run(move |state| state.use_valid_peer_connection = valid)
            .await;
    }

    pub async fn use_valid_peer_connection(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        self.run(move |state| {
            let _ = tx.send(state.use_valid_peer_connection);
        })
        .await;
        rx.await.unwrap_or(true)
    }

    pub async fn set_peer_connection_latency(&self, latency: Duration) {
        self.run(move |state| state.peer_connection_latency = latency)
            .await;
    }

    pub async fn peer_connection_latency(&self) -> Duration {
        let (tx, rx) = oneshot::channel();
        self.run(move |state| {
            let _ = tx.send(state.peer_connection_latency);
        })
        .await;
        rx.await.unwrap_or(Duration::ZERO)
    }
}
