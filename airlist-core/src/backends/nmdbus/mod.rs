use crate::backends::utils::{capabilities_from_nm_flags, percent_to_rssi};
use crate::traits::{
    ConnectionRequest, EventSink, FeatureTier, KeyManagement, NetworkProfile, Passphrase,
    PlatformEvent, SavedNetwork, ScanRecord, SubmitStatus, Suggestion, Transport, WifiInfo,
    WifiPlatform,
};
use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zbus::Connection;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};
use zbus_macros::proxy;

// 通过 D-Bus 直接与 NetworkManager 通信的平台后端。
// 扫描结果、射频开关和全局连接状态通过属性变化信号转发为平台事件。

const NM_DEVICE_TYPE_WIFI: u32 = 2;
const NM_STATE_CONNECTED_GLOBAL: u32 = 70;
const NM_ACTIVE_CONNECTION_STATE_ACTIVATED: u32 = 2;
const NM_ACTIVE_CONNECTION_STATE_DEACTIVATED: u32 = 4;
const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(30);
const SECURITY_SETTING: &str = "802-11-wireless-security";

type Settings = HashMap<String, HashMap<String, OwnedValue>>;

#[proxy(
    interface = "org.freedesktop.NetworkManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager"
)]
trait NetworkManager {
    fn get_devices(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    fn activate_connection(
        &self,
        connection: &ObjectPath<'_>,
        device: &ObjectPath<'_>,
        specific_object: &ObjectPath<'_>,
    ) -> zbus::Result<OwnedObjectPath>;

    fn add_and_activate_connection(
        &self,
        connection: Settings,
        device: &ObjectPath<'_>,
        specific_object: &ObjectPath<'_>,
    ) -> zbus::Result<(OwnedObjectPath, OwnedObjectPath)>;

    #[zbus(property)]
    fn wireless_enabled(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn set_wireless_enabled(&self, value: bool) -> zbus::Result<()>;

    #[zbus(property)]
    fn state(&self) -> zbus::Result<u32>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager/Settings"
)]
trait NmSettings {
    fn list_connections(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    fn add_connection(&self, connection: Settings) -> zbus::Result<OwnedObjectPath>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings.Connection",
    default_service = "org.freedesktop.NetworkManager"
)]
trait SettingsConnection {
    fn get_settings(&self) -> zbus::Result<Settings>;

    fn update(&self, properties: Settings) -> zbus::Result<()>;

    fn delete(&self) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device",
    default_service = "org.freedesktop.NetworkManager"
)]
trait Device {
    #[zbus(property)]
    fn device_type(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn interface(&self) -> zbus::Result<String>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Wireless",
    default_service = "org.freedesktop.NetworkManager"
)]
trait Wireless {
    fn request_scan(&self, options: HashMap<String, OwnedValue>) -> zbus::Result<()>;

    fn get_all_access_points(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    #[zbus(property)]
    fn active_access_point(&self) -> zbus::Result<OwnedObjectPath>;

    #[zbus(property)]
    fn last_scan(&self) -> zbus::Result<i64>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.AccessPoint",
    default_service = "org.freedesktop.NetworkManager"
)]
trait AccessPoint {
    #[zbus(property)]
    fn ssid(&self) -> zbus::Result<Vec<u8>>;

    #[zbus(property)]
    fn strength(&self) -> zbus::Result<u8>;

    #[zbus(property)]
    fn hw_address(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn flags(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn wpa_flags(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn rsn_flags(&self) -> zbus::Result<u32>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Connection.Active",
    default_service = "org.freedesktop.NetworkManager"
)]
trait ActiveConnection {
    #[zbus(property)]
    fn state(&self) -> zbus::Result<u32>;
}

#[derive(Debug)]
pub struct NmDbusPlatform {
    iface: String,
    conn: Connection,
    sink: Mutex<Option<EventSink>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl NmDbusPlatform {
    pub async fn new(iface: impl Into<String>) -> Result<Self> {
        let conn = Connection::system().await?;
        Ok(Self {
            iface: iface.into(),
            conn,
            sink: Mutex::new(None),
            watcher: Mutex::new(None),
        })
    }

    #[inline]
    fn ov<'a, V>(v: V) -> Result<OwnedValue>
    where
        V: Into<Value<'a>>,
    {
        Ok(v.into().try_into()?)
    }

    // Helper: pick a wireless device (prefer the configured interface)
    async fn wifi_device_path(&self) -> Result<OwnedObjectPath> {
        let nm = NetworkManagerProxy::new(&self.conn).await?;
        let mut chosen: Option<OwnedObjectPath> = None;
        for dpath in nm.get_devices().await? {
            let dev = DeviceProxy::builder(&self.conn)
                .path(dpath.clone())?
                .build()
                .await?;
            if dev.device_type().await? != NM_DEVICE_TYPE_WIFI {
                continue;
            }
            if dev.interface().await? == self.iface {
                return Ok(dpath);
            }
            if chosen.is_none() {
                chosen = Some(dpath);
            }
        }
        chosen.ok_or_else(|| Error::CommandFailed("No wireless device found".into()))
    }

    async fn wireless(&self) -> Result<WirelessProxy<'static>> {
        let dpath = self.wifi_device_path().await?;
        Ok(WirelessProxy::builder(&self.conn).path(dpath)?.build().await?)
    }

    async fn read_access_point(conn: &Connection, path: OwnedObjectPath) -> Result<ScanRecord> {
        let ap = AccessPointProxy::builder(conn).path(path)?.build().await?;
        let ssid_bytes = ap.ssid().await?;
        let ssid = String::from_utf8(ssid_bytes.clone()).unwrap_or_else(|_| {
            // fallback: hex encode if non-utf8
            format!("{:X?}", ssid_bytes)
        });
        let flags = ap.flags().await.unwrap_or(0);
        let wpa = ap.wpa_flags().await.unwrap_or(0);
        let rsn = ap.rsn_flags().await.unwrap_or(0);
        Ok(ScanRecord {
            ssid,
            capabilities: capabilities_from_nm_flags(flags, wpa, rsn),
            rssi: percent_to_rssi(ap.strength().await?),
            bssid: ap.hw_address().await?.to_ascii_lowercase(),
        })
    }

    async fn active_ssid(conn: &Connection, wifi: &WirelessProxy<'_>) -> Result<Option<String>> {
        let ap_path = wifi.active_access_point().await?;
        if ap_path.as_str() == "/" {
            return Ok(None);
        }
        let record = Self::read_access_point(conn, ap_path).await?;
        Ok(Some(record.ssid))
    }

    /// Saved wireless profiles as `(settings path, ssid)`.
    async fn wifi_profiles(&self) -> Result<Vec<(OwnedObjectPath, String)>> {
        let settings = NmSettingsProxy::new(&self.conn).await?;
        let mut profiles = Vec::new();
        for path in settings.list_connections().await? {
            let con = SettingsConnectionProxy::builder(&self.conn)
                .path(path.clone())?
                .build()
                .await?;
            let Ok(values) = con.get_settings().await else {
                continue;
            };
            let Some(ssid) = values
                .get("802-11-wireless")
                .and_then(|wifi| wifi.get("ssid"))
            else {
                continue;
            };
            let bytes = Vec::<u8>::try_from(Value::from(ssid.try_clone()?))?;
            profiles.push((path, String::from_utf8_lossy(&bytes).into_owned()));
        }
        Ok(profiles)
    }

    async fn profile_path(&self, ssid: &str) -> Result<Option<OwnedObjectPath>> {
        Ok(self
            .wifi_profiles()
            .await?
            .into_iter()
            .find(|(_, s)| s == ssid)
            .map(|(path, _)| path))
    }

    /// `existing` with its security section replaced by the one `suggestion` carries.
    fn refreshed_settings(mut existing: Settings, suggestion: &Suggestion) -> Result<Settings> {
        let mut fresh = Self::settings_for_suggestion(suggestion)?;
        match fresh.remove(SECURITY_SETTING) {
            Some(security) => {
                existing.insert(SECURITY_SETTING.into(), security);
            }
            None => {
                existing.remove(SECURITY_SETTING);
            }
        }
        Ok(existing)
    }

    /// Rewrites the stored secret of an existing profile with the one just entered.
    async fn refresh_profile(&self, path: OwnedObjectPath, suggestion: &Suggestion) -> Result<()> {
        let con = SettingsConnectionProxy::builder(&self.conn)
            .path(path)?
            .build()
            .await?;
        let existing = con.get_settings().await?;
        con.update(Self::refreshed_settings(existing, suggestion)?)
            .await?;
        info!("🔑 [nmdbus] Updated stored credentials for '{}'", suggestion.ssid);
        Ok(())
    }

    fn settings_for_suggestion(suggestion: &Suggestion) -> Result<Settings> {
        let (key_mgmt, psk) = match &suggestion.passphrase {
            Some(Passphrase::Wpa2(secret)) => (Some("wpa-psk"), Some(secret.as_str())),
            Some(Passphrase::Wpa3(secret)) => (Some("sae"), Some(secret.as_str())),
            None => (None, None),
        };
        Self::build_settings(&suggestion.ssid, key_mgmt, psk, None)
    }

    fn settings_for_profile(profile: &NetworkProfile) -> Result<Settings> {
        let secret = profile.secret.as_deref();
        match profile.key_mgmt {
            KeyManagement::None => Self::build_settings(&profile.ssid, None, None, None),
            KeyManagement::WpaPsk => {
                Self::build_settings(&profile.ssid, Some("wpa-psk"), secret, None)
            }
            KeyManagement::Wep => Self::build_settings(&profile.ssid, Some("none"), None, secret),
        }
    }

    fn build_settings(
        ssid: &str,
        key_mgmt: Option<&str>,
        psk: Option<&str>,
        wep_key: Option<&str>,
    ) -> Result<Settings> {
        // connection setting
        let mut s_connection: HashMap<String, OwnedValue> = HashMap::new();
        s_connection.insert("id".into(), Self::ov(ssid)?);
        s_connection.insert("type".into(), Self::ov("802-11-wireless")?);

        // wireless setting (infrastructure is default)
        let mut s_wifi: HashMap<String, OwnedValue> = HashMap::new();
        s_wifi.insert("ssid".into(), Self::ov(ssid.as_bytes().to_vec())?);

        let mut s_ipv4: HashMap<String, OwnedValue> = HashMap::new();
        s_ipv4.insert("method".into(), Self::ov("auto")?);

        let mut settings: Settings = HashMap::new();
        settings.insert("connection".into(), s_connection);
        settings.insert("802-11-wireless".into(), s_wifi);
        settings.insert("ipv4".into(), s_ipv4);

        // security (optional)
        if let Some(key_mgmt) = key_mgmt {
            let mut s_sec: HashMap<String, OwnedValue> = HashMap::new();
            s_sec.insert("key-mgmt".into(), Self::ov(key_mgmt)?);
            if let Some(psk) = psk {
                s_sec.insert("psk".into(), Self::ov(psk)?);
            }
            if let Some(key) = wep_key {
                s_sec.insert("wep-key0".into(), Self::ov(key)?);
                s_sec.insert("wep-key-type".into(), Self::ov(1u32)?);
            }
            settings.insert(SECURITY_SETTING.into(), s_sec);
        }
        Ok(settings)
    }

    /// Activates `profile` and reports failure or timeout through the sink.
    async fn activate_profile(&self, ssid: &str, profile: OwnedObjectPath) -> Result<()> {
        let nm = NetworkManagerProxy::new(&self.conn).await?;
        let device = self.wifi_device_path().await?;
        let specific = ObjectPath::try_from("/")?;
        let ac_path = nm
            .activate_connection(&profile, &device, &specific)
            .await?;
        self.watch_activation(ssid, ac_path).await;
        Ok(())
    }

    async fn watch_activation(&self, ssid: &str, ac_path: OwnedObjectPath) {
        let Some(sink) = self.sink.lock().await.clone() else {
            return;
        };
        let conn = self.conn.clone();
        let ssid = ssid.to_owned();
        tokio::spawn(async move {
            let event = match Self::wait_activated(&conn, ac_path).await {
                Ok(true) => return,
                Ok(false) => PlatformEvent::SuggestionRejected {
                    ssid,
                    reason: "connection deactivated".into(),
                },
                Err(Error::CommandFailed(reason)) if reason == "timeout" => {
                    PlatformEvent::ConnectTimedOut { ssid }
                }
                Err(e) => PlatformEvent::SuggestionRejected {
                    ssid,
                    reason: e.to_string(),
                },
            };
            let _ = sink.emit(event);
        });
    }

    async fn wait_activated(conn: &Connection, ac_path: OwnedObjectPath) -> Result<bool> {
        let ac = ActiveConnectionProxy::builder(conn).path(ac_path)?.build().await?;
        let mut states = ac.receive_state_changed().await;
        let fut = async {
            while let Some(change) = states.next().await {
                match change.get().await? {
                    NM_ACTIVE_CONNECTION_STATE_ACTIVATED => return Ok(true),
                    NM_ACTIVE_CONNECTION_STATE_DEACTIVATED => return Ok(false),
                    _ => continue,
                }
            }
            Ok::<bool, Error>(false)
        };
        match tokio::time::timeout(ACTIVATION_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::CommandFailed("timeout".into())),
        }
    }

    async fn watch_events(
        conn: Connection,
        device: OwnedObjectPath,
        sink: EventSink,
    ) -> Result<()> {
        let nm = NetworkManagerProxy::new(&conn).await?;
        let wifi = WirelessProxy::builder(&conn).path(device)?.build().await?;
        let mut radio = nm.receive_wireless_enabled_changed().await;
        let mut global = nm.receive_state_changed().await;
        let mut scans = wifi.receive_last_scan_changed().await;

        loop {
            tokio::select! {
                Some(change) = radio.next() => {
                    sink.emit(PlatformEvent::RadioStateChanged(change.get().await?))?;
                }
                Some(_) = scans.next() => {
                    sink.emit(PlatformEvent::ScanResultsAvailable)?;
                }
                Some(change) = global.next() => {
                    if change.get().await? == NM_STATE_CONNECTED_GLOBAL {
                        let ssid = Self::active_ssid(&conn, &wifi).await.unwrap_or(None);
                        let transport = if ssid.is_some() { Transport::Wifi } else { Transport::Other };
                        sink.emit(PlatformEvent::CapabilitiesChanged {
                            validated: true,
                            transport,
                            ssid,
                        })?;
                    }
                }
                else => break,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WifiPlatform for NmDbusPlatform {
    fn feature_tier(&self) -> FeatureTier {
        FeatureTier::Suggestion
    }

    async fn register(&self, sink: EventSink) -> Result<()> {
        let mut slot = self.sink.lock().await;
        if slot.is_some() {
            return Err(Error::AlreadyRegistered);
        }
        let device = self.wifi_device_path().await?;
        let conn = self.conn.clone();
        let events = sink.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = Self::watch_events(conn, device, events).await {
                warn!("⚠️ [nmdbus] Event watcher stopped: {}", e);
            }
        });
        *slot = Some(sink);
        *self.watcher.lock().await = Some(handle);
        info!("🔌 [nmdbus] Listening for NetworkManager signals");
        Ok(())
    }

    async fn unregister(&self) -> Result<()> {
        if let Some(handle) = self.watcher.lock().await.take() {
            handle.abort();
        }
        self.sink.lock().await.take();
        Ok(())
    }

    async fn is_wifi_enabled(&self) -> Result<bool> {
        let nm = NetworkManagerProxy::new(&self.conn).await?;
        Ok(nm.wireless_enabled().await?)
    }

    async fn scan_results(&self) -> Result<Vec<ScanRecord>> {
        let wifi = self.wireless().await?;
        let mut records = Vec::new();
        for ap_path in wifi.get_all_access_points().await? {
            // Access points vanish between listing and reading; skip those.
            match Self::read_access_point(&self.conn, ap_path).await {
                Ok(record) => records.push(record),
                Err(e) => debug!("Skipping access point: {}", e),
            }
        }
        Ok(records)
    }

    async fn connection_info(&self) -> Result<Option<WifiInfo>> {
        let wifi = self.wireless().await?;
        let ap_path = wifi.active_access_point().await?;
        if ap_path.as_str() == "/" {
            return Ok(None);
        }
        let record = Self::read_access_point(&self.conn, ap_path).await?;
        Ok(Some(WifiInfo {
            ssid: record.ssid,
            bssid: Some(record.bssid),
        }))
    }

    async fn saved_networks(&self) -> Result<Vec<SavedNetwork>> {
        Ok(self
            .wifi_profiles()
            .await?
            .into_iter()
            .map(|(path, ssid)| SavedNetwork {
                id: path.as_str().to_owned(),
                ssid,
            })
            .collect())
    }

    async fn set_wifi_enabled(&self, enabled: bool) -> Result<()> {
        let nm = NetworkManagerProxy::new(&self.conn).await?;
        nm.set_wireless_enabled(enabled).await?;
        Ok(())
    }

    async fn open_wifi_settings(&self) -> Result<()> {
        tokio::process::Command::new("nm-connection-editor").spawn()?;
        Ok(())
    }

    async fn request_scan(&self) -> Result<()> {
        let wifi = self.wireless().await?;
        wifi.request_scan(HashMap::new()).await?;
        Ok(())
    }

    async fn submit(&self, request: &ConnectionRequest) -> Result<SubmitStatus> {
        match request {
            ConnectionRequest::Suggestion(suggestion) => {
                if let Some(path) = self.profile_path(&suggestion.ssid).await? {
                    if suggestion.passphrase.is_some() {
                        if let Err(e) = self.refresh_profile(path, suggestion).await {
                            return Ok(SubmitStatus::Rejected(e.to_string()));
                        }
                    }
                    return Ok(SubmitStatus::Duplicate);
                }
                let settings = NmSettingsProxy::new(&self.conn).await?;
                match settings
                    .add_connection(Self::settings_for_suggestion(suggestion)?)
                    .await
                {
                    Ok(_) => Ok(SubmitStatus::Accepted),
                    Err(e) => Ok(SubmitStatus::Rejected(e.to_string())),
                }
            }
            ConnectionRequest::Profile(profile) => {
                let nm = NetworkManagerProxy::new(&self.conn).await?;
                let device = self.wifi_device_path().await?;
                let specific = ObjectPath::try_from("/")?;
                match nm
                    .add_and_activate_connection(
                        Self::settings_for_profile(profile)?,
                        &device,
                        &specific,
                    )
                    .await
                {
                    Ok((_con_path, ac_path)) => {
                        self.watch_activation(&profile.ssid, ac_path).await;
                        Ok(SubmitStatus::Accepted)
                    }
                    Err(e) => Ok(SubmitStatus::Rejected(e.to_string())),
                }
            }
            ConnectionRequest::Saved(saved) => {
                let path = OwnedObjectPath::try_from(saved.id.as_str())?;
                self.activate_profile(&saved.ssid, path).await?;
                Ok(SubmitStatus::Accepted)
            }
        }
    }

    async fn activate(&self, request: &ConnectionRequest) -> Result<()> {
        match request {
            ConnectionRequest::Suggestion(suggestion) => {
                let profile = self
                    .profile_path(&suggestion.ssid)
                    .await?
                    .ok_or_else(|| Error::NoMatchingNetwork(suggestion.ssid.clone()))?;
                self.activate_profile(&suggestion.ssid, profile).await
            }
            // Profiles and saved entries are activated by `submit` itself.
            ConnectionRequest::Profile(_) | ConnectionRequest::Saved(_) => Ok(()),
        }
    }

    async fn remove(&self, ssid: &str) -> Result<()> {
        for (path, profile_ssid) in self.wifi_profiles().await? {
            if profile_ssid != ssid {
                continue;
            }
            let con = SettingsConnectionProxy::builder(&self.conn)
                .path(path)?
                .build()
                .await?;
            con.delete().await?;
        }
        Ok(())
    }
}
