/// HID transport: find a DualSense, write output reports, follow hot-plug.
///
/// - Filter by VID/PID + usage page 0x01 / usage 0x05 (gamepad collection)
/// - USB vs Bluetooth from the reported bus type, path markers as fallback
/// - Activate Bluetooth extended mode via feature report 0x05
/// - Write errors are non-fatal: log, drop the device, retry later
///
/// Connect, disconnect and send all run under one mutex. The hot-plug watcher
/// thread takes the same lock before reconnecting, so a reconnect can never
/// interleave with an in-flight write.

use crate::report::HapticReport;
use crate::rumble::RumbleEffect;
use crate::sink::{OutputSink, SinkError};
use crate::trigger::TriggerEffect;
use hidapi::{BusType, HidApi, HidDevice};
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const SONY_VID: u16 = 0x054C;
const DUALSENSE_PID: u16 = 0x0CE6;
const DUALSENSE_EDGE_PID: u16 = 0x0DF2;

/// HID usage page and usage for gamepad collections.
const GAMEPAD_USAGE_PAGE: u16 = 0x01; // Generic Desktop
const GAMEPAD_USAGE: u16 = 0x05; // Game Pad

/// Reading this feature report switches a Bluetooth DualSense to full reports.
const BT_EXTENDED_MODE_FEATURE: u8 = 0x05;

/// Controllers with adaptive triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerModel {
    DualSense,
    DualSenseEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Usb,
    Bluetooth,
}

impl std::fmt::Display for ControllerModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerModel::DualSense => f.write_str("DualSense"),
            ControllerModel::DualSenseEdge => f.write_str("DualSense Edge"),
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionType::Usb => f.write_str("USB"),
            ConnectionType::Bluetooth => f.write_str("Bluetooth"),
        }
    }
}

pub fn identify(vid: u16, pid: u16) -> Option<ControllerModel> {
    match (vid, pid) {
        (SONY_VID, DUALSENSE_PID) => Some(ControllerModel::DualSense),
        (SONY_VID, DUALSENSE_EDGE_PID) => Some(ControllerModel::DualSenseEdge),
        _ => None,
    }
}

/// Transport from the bus hidapi reports. Backends that cannot tell fall back to
/// the device path.
pub fn connection_for(bus: BusType, path: &str) -> ConnectionType {
    match bus {
        BusType::Bluetooth => ConnectionType::Bluetooth,
        BusType::Usb => ConnectionType::Usb,
        BusType::Unknown | BusType::I2c | BusType::Spi => detect_connection(path),
    }
}

/// Windows Bluetooth HID paths carry the Bluetooth HID service GUID or the
/// `&0005` bus marker; anything else is treated as USB.
pub fn detect_connection(path: &str) -> ConnectionType {
    let lower = path.to_ascii_lowercase();
    if lower.contains("&0005") || lower.contains("{00001124") {
        ConnectionType::Bluetooth
    } else {
        ConnectionType::Usb
    }
}

struct ControllerInfo {
    model: ControllerModel,
    connection: ConnectionType,
    path: CString,
}

/// All gamepad collections of supported controllers, in enumeration order.
fn candidates(api: &HidApi) -> Vec<ControllerInfo> {
    api.device_list()
        .filter(|dev| dev.usage_page() == GAMEPAD_USAGE_PAGE && dev.usage() == GAMEPAD_USAGE)
        .filter_map(|dev| {
            let model = identify(dev.vendor_id(), dev.product_id())?;
            let path = dev.path().to_owned();
            let connection = connection_for(dev.bus_type(), &path.to_string_lossy());
            Some(ControllerInfo { model, connection, path })
        })
        .collect()
}

/// USB first: no CRC and lower latency.
fn pick_controller(api: &HidApi) -> Option<ControllerInfo> {
    let mut all = candidates(api);
    all.sort_by_key(|c| c.connection == ConnectionType::Bluetooth);
    all.into_iter().next()
}

fn activate_bt_extended_mode(device: &HidDevice) {
    let mut buf = [0u8; 64];
    buf[0] = BT_EXTENDED_MODE_FEATURE;
    match device.get_feature_report(&mut buf) {
        Ok(n) => log::info!("BT extended mode activated ({n} bytes)"),
        Err(e) => log::warn!("Failed to read feature report 0x05: {e}. Triggers may not respond."),
    }
}

/// Everything that changes on connect/disconnect. Only touched under the lock.
#[derive(Default)]
struct Link {
    device: Option<HidDevice>,
    report: Option<HapticReport>,
}

impl Link {
    fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    fn connect(&mut self, api: &mut HidApi) -> Result<(), SinkError> {
        if self.is_connected() {
            return Ok(());
        }
        api.refresh_devices().map_err(SinkError::HidInit)?;
        let info = pick_controller(api).ok_or(SinkError::NoController)?;
        let device = api.open_path(&info.path).map_err(SinkError::Open)?;
        if info.connection == ConnectionType::Bluetooth {
            activate_bt_extended_mode(&device);
        }
        log::info!("Connected: {} ({})", info.model, info.connection);
        self.device = Some(device);
        self.report = Some(HapticReport::new(info.connection));
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.device.take().is_some() {
            log::info!("Controller disconnected");
        }
        self.report = None;
    }

    /// Encode and write one report. A failed write drops the device.
    fn send(&mut self, left: &TriggerEffect, right: &TriggerEffect, rumble: RumbleEffect) {
        let (Some(device), Some(report)) = (self.device.as_ref(), self.report.as_mut()) else {
            return;
        };
        let bytes = report.encode(left, right, rumble);
        if let Err(e) = device.write(bytes) {
            log::warn!("{}", SinkError::Write(e));
            self.disconnect();
        }
    }

    fn send_safe_state(&mut self) {
        let (Some(device), Some(report)) = (self.device.as_ref(), self.report.as_mut()) else {
            return;
        };
        if let Err(e) = device.write(report.encode_safe_state()) {
            log::warn!("Safe state not delivered: {}", SinkError::Write(e));
            self.disconnect();
        }
    }
}

fn lock(link: &Mutex<Link>) -> MutexGuard<'_, Link> {
    link.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Output sink writing DualSense output reports over HID.
pub struct HidSink {
    api: HidApi,
    link: Arc<Mutex<Link>>,
    watcher_stop: Arc<AtomicBool>,
}

impl HidSink {
    pub fn new(hotplug_poll: Duration) -> Result<Self, SinkError> {
        let api = HidApi::new().map_err(SinkError::HidInit)?;
        let link = Arc::new(Mutex::new(Link::default()));
        let watcher_stop = Arc::new(AtomicBool::new(false));
        spawn_hotplug_watcher(Arc::clone(&link), Arc::clone(&watcher_stop), hotplug_poll);
        Ok(Self { api, link, watcher_stop })
    }
}

impl OutputSink for HidSink {
    fn connect(&mut self) -> bool {
        let mut link = lock(&self.link);
        match link.connect(&mut self.api) {
            Ok(()) => true,
            Err(SinkError::NoController) => {
                log::debug!("No controller found");
                false
            }
            Err(e) => {
                log::warn!("{e}");
                false
            }
        }
    }

    fn send(&mut self, left: &TriggerEffect, right: &TriggerEffect, rumble: RumbleEffect) {
        lock(&self.link).send(left, right, rumble);
    }

    fn send_safe_state(&mut self) {
        lock(&self.link).send_safe_state();
    }

    fn is_connected(&self) -> bool {
        lock(&self.link).is_connected()
    }
}

impl Drop for HidSink {
    fn drop(&mut self) {
        self.watcher_stop.store(true, Ordering::Relaxed);
        let mut link = lock(&self.link);
        link.send_safe_state();
        link.disconnect();
    }
}

/// Rescan the device list every `poll` and reconnect when it changes while
/// we're disconnected. Runs on its own thread with its own `HidApi`.
fn spawn_hotplug_watcher(link: Arc<Mutex<Link>>, stop: Arc<AtomicBool>, poll: Duration) {
    let spawned = std::thread::Builder::new()
        .name("hid-hotplug".into())
        .spawn(move || {
            let Ok(mut api) = HidApi::new() else {
                log::warn!("Hot-plug watcher: failed to create HidApi instance");
                return;
            };
            let mut known = device_paths(&api);
            loop {
                std::thread::sleep(poll);
                if stop.load(Ordering::Relaxed) {
                    log::debug!("Hot-plug watcher: stop signal received");
                    return;
                }
                if let Err(e) = api.refresh_devices() {
                    log::debug!("Hot-plug refresh failed: {e}");
                    continue;
                }
                let current = device_paths(&api);
                if current == known {
                    continue;
                }
                known = current;
                log::debug!("Device list changed ({} candidate(s))", known.len());

                let mut link = lock(&link);
                if !link.is_connected() {
                    if let Err(e) = link.connect(&mut api) {
                        log::debug!("Hot-plug reconnect: {e}");
                    }
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("Failed to start hot-plug watcher: {e}");
    }
}

fn device_paths(api: &HidApi) -> Vec<CString> {
    candidates(api).into_iter().map(|c| c.path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_trigger_capable_controllers() {
        assert_eq!(identify(0x054C, 0x0CE6), Some(ControllerModel::DualSense));
        assert_eq!(identify(0x054C, 0x0DF2), Some(ControllerModel::DualSenseEdge));
    }

    #[test]
    fn identify_rejects_others() {
        // DualShock 4 has no adaptive triggers.
        assert_eq!(identify(0x054C, 0x09CC), None);
        assert_eq!(identify(0x0001, 0x0CE6), None);
    }

    #[test]
    fn detect_usb_path() {
        let path = r"\\?\hid#vid_054c&pid_0ce6&mi_03#8&hash&0&0000#{4d1e55b2-f16f-11cf-88cb-001111000030}";
        assert_eq!(detect_connection(path), ConnectionType::Usb);
    }

    #[test]
    fn detect_bt_path() {
        let path = r"\\?\hid#{00001124-0000-1000-8000-00805f9b34fb}_vid&0002054c_pid&0ce6#8&hash&0&0000#{4d1e55b2-f16f-11cf-88cb-001111000030}";
        assert_eq!(detect_connection(path), ConnectionType::Bluetooth);
    }

    #[test]
    fn bus_type_wins_over_path() {
        assert_eq!(connection_for(BusType::Bluetooth, "/dev/hidraw3"), ConnectionType::Bluetooth);
        assert_eq!(connection_for(BusType::Usb, "/dev/hidraw3"), ConnectionType::Usb);
    }

    #[test]
    fn unknown_bus_falls_back_to_path() {
        let bt = r"\\?\hid#{00001124-0000-1000-8000-00805f9b34fb}_vid&0002054c_pid&0ce6";
        assert_eq!(connection_for(BusType::Unknown, bt), ConnectionType::Bluetooth);
        assert_eq!(connection_for(BusType::Unknown, "/dev/hidraw3"), ConnectionType::Usb);
    }

    #[test]
    fn link_without_device_ignores_sends() {
        let mut link = Link::default();
        assert!(!link.is_connected());
        link.send(&TriggerEffect::feedback(2, 4), &TriggerEffect::Off, RumbleEffect::new(0.5, 0.5));
        link.send_safe_state();
        link.disconnect();
        assert!(link.report.is_none());
    }
}
