use crate::backends::utils::{parse_wifi_list, split_terse};
use crate::traits::{
    ConnectionRequest, EventSink, FeatureTier, KeyManagement, PlatformEvent, SavedNetwork,
    ScanRecord, SubmitStatus, Transport, WifiInfo, WifiPlatform,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// 通过调用 nmcli 命令行工具实现的平台后端，适用于使用 NetworkManager 管理网络连接的 Linux 系统。
// nmcli 没有事件回调，事件在各命令完成后由本后端自行投递。

const WIFI_CONNECTION_TYPE: &str = "802-11-wireless";

#[derive(Debug)]
pub struct NmcliPlatform {
    iface: String,
    sink: Arc<Mutex<Option<EventSink>>>,
}

impl NmcliPlatform {
    pub fn new(iface: impl Into<String>) -> Self {
        Self {
            iface: iface.into(),
            sink: Arc::new(Mutex::new(None)),
        }
    }

    async fn emit(sink: &Mutex<Option<EventSink>>, event: PlatformEvent) {
        if let Some(sink) = sink.lock().await.as_ref() {
            if let Err(e) = sink.emit(event) {
                debug!("Dropping nmcli event: {}", e);
            }
        }
    }

    /// Arguments for `nmcli` that carry out `request` on `iface`.
    fn connect_args(request: &ConnectionRequest, iface: &str) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        match request {
            ConnectionRequest::Saved(saved) => {
                args.extend(["connection", "up", "uuid"].map(String::from));
                args.push(saved.id.clone());
            }
            ConnectionRequest::Profile(profile) => {
                args.extend(["device", "wifi", "connect"].map(String::from));
                args.push(profile.ssid.clone());
                if let Some(secret) = &profile.secret {
                    if profile.key_mgmt == KeyManagement::Wep {
                        args.extend(["wep-key-type", "key"].map(String::from));
                    }
                    args.push("password".into());
                    args.push(secret.clone());
                }
            }
            ConnectionRequest::Suggestion(suggestion) => {
                args.extend(["device", "wifi", "connect"].map(String::from));
                args.push(suggestion.ssid.clone());
                if !suggestion.bssid.is_empty() {
                    args.push("bssid".into());
                    args.push(suggestion.bssid.clone());
                }
                if let Some(passphrase) = &suggestion.passphrase {
                    args.push("password".into());
                    args.push(passphrase.secret().to_owned());
                }
            }
        }
        args.push("ifname".into());
        args.push(iface.to_owned());
        args
    }
}

/// Runs nmcli and returns stdout, mapping authorization failures to `PermissionDenied`.
async fn run_nmcli<I, S>(args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let output = Command::new("nmcli").args(args).output().await?;
    if !output.status.success() {
        let err = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if err.contains("Not authorized") || err.contains("not authorized") {
            return Err(Error::PermissionDenied(err));
        }
        return Err(Error::CommandFailed(format!("nmcli failed: {}", err)));
    }
    Ok(String::from_utf8(output.stdout)?)
}

/// polkit denying `radio wifi` means this user may not toggle the radio at all.
fn radio_toggle_error(err: Error) -> Error {
    match err {
        Error::PermissionDenied(reason) => {
            warn!("⚠️ [nmcli] Radio toggle refused: {}", reason);
            Error::RadioToggleUnsupported
        }
        other => other,
    }
}

#[async_trait]
impl WifiPlatform for NmcliPlatform {
    fn feature_tier(&self) -> FeatureTier {
        FeatureTier::Profile
    }

    async fn register(&self, sink: EventSink) -> Result<()> {
        let mut slot = self.sink.lock().await;
        if slot.is_some() {
            return Err(Error::AlreadyRegistered);
        }
        *slot = Some(sink);
        Ok(())
    }

    async fn unregister(&self) -> Result<()> {
        self.sink.lock().await.take();
        Ok(())
    }

    async fn is_wifi_enabled(&self) -> Result<bool> {
        let out = run_nmcli(["-t", "radio", "wifi"]).await?;
        Ok(out.trim() == "enabled")
    }

    async fn scan_results(&self) -> Result<Vec<ScanRecord>> {
        let out = run_nmcli([
            "-t",
            "-f",
            "SSID,BSSID,SIGNAL,SECURITY",
            "device",
            "wifi",
            "list",
            "ifname",
            self.iface.as_str(),
            "--rescan",
            "no",
        ])
        .await?;
        Ok(parse_wifi_list(&out))
    }

    async fn connection_info(&self) -> Result<Option<WifiInfo>> {
        let out = run_nmcli([
            "-t",
            "-f",
            "ACTIVE,SSID,BSSID",
            "device",
            "wifi",
            "list",
            "ifname",
            self.iface.as_str(),
            "--rescan",
            "no",
        ])
        .await?;
        Ok(out.lines().map(split_terse).find_map(|fields| {
            match fields.as_slice() {
                [active, ssid, bssid, ..] if active == "yes" => Some(WifiInfo {
                    ssid: ssid.clone(),
                    bssid: Some(bssid.to_ascii_lowercase()),
                }),
                _ => None,
            }
        }))
    }

    async fn saved_networks(&self) -> Result<Vec<SavedNetwork>> {
        let out = run_nmcli(["-t", "-f", "UUID,TYPE", "connection", "show"]).await?;
        let mut saved = Vec::new();
        for fields in out.lines().map(split_terse) {
            let [uuid, kind, ..] = fields.as_slice() else {
                continue;
            };
            if kind != WIFI_CONNECTION_TYPE {
                continue;
            }
            match run_nmcli(["-g", "802-11-wireless.ssid", "connection", "show", uuid.as_str()]).await {
                Ok(ssid) => saved.push(SavedNetwork {
                    id: uuid.clone(),
                    ssid: ssid.trim().to_string(),
                }),
                Err(e) => debug!("Skipping profile {}: {}", uuid, e),
            }
        }
        Ok(saved)
    }

    async fn set_wifi_enabled(&self, enabled: bool) -> Result<()> {
        run_nmcli(["radio", "wifi", if enabled { "on" } else { "off" }])
            .await
            .map_err(radio_toggle_error)?;
        Self::emit(&self.sink, PlatformEvent::RadioStateChanged(enabled)).await;
        Ok(())
    }

    async fn open_wifi_settings(&self) -> Result<()> {
        info!("⚙️ [nmcli] No settings surface; use `nmcli radio wifi on|off`");
        Ok(())
    }

    async fn request_scan(&self) -> Result<()> {
        let iface = self.iface.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = run_nmcli(["device", "wifi", "rescan", "ifname", iface.as_str()]).await {
                // A rescan right after another one is refused; cached results are still valid.
                debug!("nmcli rescan: {}", e);
            }
            Self::emit(&sink, PlatformEvent::ScanResultsAvailable).await;
        });
        Ok(())
    }

    async fn submit(&self, request: &ConnectionRequest) -> Result<SubmitStatus> {
        let args = Self::connect_args(request, &self.iface);
        let ssid = request.ssid().to_owned();
        let sink = self.sink.clone();
        info!("📡 [nmcli] Connecting to '{}'", ssid);

        tokio::spawn(async move {
            let event = match run_nmcli(&args).await {
                Ok(_) => PlatformEvent::CapabilitiesChanged {
                    validated: true,
                    transport: Transport::Wifi,
                    ssid: Some(ssid),
                },
                Err(e) => {
                    let reason = e.to_string();
                    warn!("❌ [nmcli] Connection to '{}' failed: {}", ssid, reason);
                    if reason.contains("Timeout") || reason.contains("timed out") {
                        PlatformEvent::ConnectTimedOut { ssid }
                    } else {
                        PlatformEvent::SuggestionRejected { ssid, reason }
                    }
                }
            };
            Self::emit(&sink, event).await;
        });
        Ok(SubmitStatus::Accepted)
    }

    async fn activate(&self, request: &ConnectionRequest) -> Result<()> {
        debug!("[nmcli] connect already activates '{}'", request.ssid());
        Ok(())
    }

    async fn remove(&self, ssid: &str) -> Result<()> {
        run_nmcli(["connection", "delete", "id", ssid]).await?;
        Ok(())
    }
}
