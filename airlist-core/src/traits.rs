use crate::cipher::CipherType;
use crate::reactor::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// 在这里定义共享的数据模型，以及所有平台后端需要实现的 trait。

/// One access point as reported by a platform scan.
/// Wi-Fi 扫描时单个接入点的原始信息，收到后不再修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub ssid: String,
    /// Raw capability descriptor, e.g. "[WPA2-PSK-CCMP][ESS]".
    pub capabilities: String,
    /// Signal strength in dBm.
    pub rssi: i32,
    pub bssid: String,
}

/// The strongest representative of one `(ssid, capabilities)` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedNetwork {
    pub ssid: String,
    pub cipher: CipherType,
    /// Discretized level, 0 is the weakest bucket.
    pub signal_level: u8,
    pub rssi: i32,
    pub bssid: String,
    pub capabilities: String,
}

impl From<&RankedNetwork> for ScanRecord {
    fn from(n: &RankedNetwork) -> Self {
        ScanRecord {
            ssid: n.ssid.clone(),
            capabilities: n.capabilities.clone(),
            rssi: n.rssi,
            bssid: n.bssid.clone(),
        }
    }
}

/// Identity of the network the device is currently associated with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiInfo {
    pub ssid: String,
    pub bssid: Option<String>,
}

/// A connection entry the platform already trusts (saved profile or accepted suggestion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedNetwork {
    pub id: String,
    pub ssid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Passphrase {
    Wpa2(String),
    Wpa3(String),
}

impl Passphrase {
    pub fn secret(&self) -> &str {
        match self {
            Passphrase::Wpa2(s) | Passphrase::Wpa3(s) => s,
        }
    }
}

/// Connection suggestion handed to platforms that manage association themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub ssid: String,
    pub bssid: String,
    pub passphrase: Option<Passphrase>,
    pub app_interaction_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyManagement {
    None,
    Wep,
    WpaPsk,
}

/// Full network profile for platforms that take explicit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub ssid: String,
    pub key_mgmt: KeyManagement,
    pub secret: Option<String>,
}

/// The single outbound request produced by one `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionRequest {
    Profile(NetworkProfile),
    Suggestion(Suggestion),
    Saved(SavedNetwork),
}

impl ConnectionRequest {
    pub fn ssid(&self) -> &str {
        match self {
            ConnectionRequest::Profile(p) => &p.ssid,
            ConnectionRequest::Suggestion(s) => &s.ssid,
            ConnectionRequest::Saved(s) => &s.ssid,
        }
    }
}

/// Platform answer to `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStatus {
    Accepted,
    /// The platform already holds this suggestion; a follow-up activation is still needed.
    Duplicate,
    Rejected(String),
}

/// Feature tier advertised by a platform, negotiated once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureTier {
    Profile,
    Suggestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Wifi,
    Cellular,
    Other,
}

/// Events delivered by the platform, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    RadioStateChanged(bool),
    ScanResultsAvailable,
    CapabilitiesChanged {
        validated: bool,
        transport: Transport,
        ssid: Option<String>,
    },
    SuggestionPostConnection { ssid: String },
    SuggestionRejected { ssid: String, reason: String },
    ConnectTimedOut { ssid: String },
}

/// Sending half handed to a platform on registration.
/// Cloneable and usable from any thread; every event lands on the reactor queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Message>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: PlatformEvent) -> crate::Result<()> {
        self.tx
            .send(Message::Platform(event))
            .map_err(|_| crate::Error::ChannelClosed)
    }
}

/// 平台能力接口：查询、命令与事件注册。
///
/// Implementations wrap an OS networking subsystem. At most one event
/// registration may be active at a time; a second `register` returns
/// [`crate::Error::AlreadyRegistered`].
#[async_trait]
pub trait WifiPlatform: Send + Sync {
    /// Feature tier this platform supports.
    fn feature_tier(&self) -> FeatureTier;

    async fn register(&self, sink: EventSink) -> crate::Result<()>;

    async fn unregister(&self) -> crate::Result<()>;

    async fn is_wifi_enabled(&self) -> crate::Result<bool>;

    /// Currently visible access points, unfiltered.
    async fn scan_results(&self) -> crate::Result<Vec<ScanRecord>>;

    async fn connection_info(&self) -> crate::Result<Option<WifiInfo>>;

    async fn saved_networks(&self) -> crate::Result<Vec<SavedNetwork>>;

    async fn set_wifi_enabled(&self, enabled: bool) -> crate::Result<()>;

    /// Bring up the system Wi-Fi settings surface.
    async fn open_wifi_settings(&self) -> crate::Result<()>;

    /// Fire-and-forget; completion arrives as `ScanResultsAvailable`.
    async fn request_scan(&self) -> crate::Result<()>;

    async fn submit(&self, request: &ConnectionRequest) -> crate::Result<SubmitStatus>;

    /// Follow-up request that asks the platform to bring up an accepted suggestion.
    async fn activate(&self, request: &ConnectionRequest) -> crate::Result<()>;

    /// Remove a previously submitted suggestion or profile.
    async fn remove(&self, ssid: &str) -> crate::Result<()>;
}
