//! Single-consumer event loop.
//!
//! Platform events and user commands share one queue and are handled in
//! arrival order. After each message the full [`ConnectionState`] is
//! published on a `watch` channel, so observers never see a half-applied
//! update.

use crate::orchestrator::{ConnectPhase, Orchestrator};
use crate::reducer::{SignalScale, reduce};
use crate::tier::{ConnectTier, RadioToggle};
use crate::traits::{PlatformEvent, RankedNetwork, Transport, WifiPlatform};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// User intents coming from the presentation side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect {
        ssid: String,
        bssid: Option<String>,
        credential: Option<String>,
    },
    ProvideCredential(String),
    DismissCredential,
    SetWifiEnabled(bool),
    RequestScan,
    Forget { ssid: String },
}

#[derive(Debug)]
pub enum Message {
    Platform(PlatformEvent),
    Command(Command),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentConnection {
    pub ssid: String,
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub wifi_enabled: bool,
    pub current_connection: Option<CurrentConnection>,
    /// `None` until the first scan lands, and again while the radio is off.
    pub scan_results: Option<Vec<RankedNetwork>>,
    pub phase: ConnectPhase,
    /// The last radio toggle was handed to the system settings surface.
    pub settings_redirect: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            wifi_enabled: false,
            current_connection: None,
            scan_results: None,
            phase: ConnectPhase::Idle,
            settings_redirect: false,
        }
    }
}

pub struct Reactor {
    platform: Arc<dyn WifiPlatform>,
    tier: Arc<dyn ConnectTier>,
    orchestrator: Orchestrator,
    scale: SignalScale,
    state: ConnectionState,
    rx: mpsc::UnboundedReceiver<Message>,
    publisher: watch::Sender<ConnectionState>,
}

impl Reactor {
    pub fn new(
        platform: Arc<dyn WifiPlatform>,
        tier: Arc<dyn ConnectTier>,
        scale: SignalScale,
        rx: mpsc::UnboundedReceiver<Message>,
        publisher: watch::Sender<ConnectionState>,
    ) -> Self {
        let orchestrator = Orchestrator::new(platform.clone(), tier.clone());
        Self {
            platform,
            tier,
            orchestrator,
            scale,
            state: ConnectionState::default(),
            rx,
            publisher,
        }
    }

    /// Runs until a `Shutdown` message arrives or every sender is gone.
    pub async fn run(mut self) {
        info!("🔄 Reactor started ({:?} tier)", self.tier.kind());
        self.prime().await;
        self.publish();

        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Shutdown => break,
                Message::Platform(event) => self.handle_event(event).await,
                Message::Command(command) => self.handle_command(command).await,
            }
            self.publish();
        }
        info!("🛑 Reactor stopped");
    }

    /// Reads the initial radio and association state, then kicks off a scan.
    async fn prime(&mut self) {
        match self.platform.is_wifi_enabled().await {
            Ok(enabled) => self.state.wifi_enabled = enabled,
            Err(e) => warn!("⚠️ Could not read radio state: {}", e),
        }
        if !self.state.wifi_enabled {
            return;
        }
        if let Some(ssid) = self.associated_ssid().await {
            self.state.current_connection = Some(CurrentConnection { ssid });
        }
        self.request_scan().await;
    }

    fn publish(&mut self) {
        self.state.phase = self.orchestrator.phase().clone();
        let next = &self.state;
        self.publisher.send_if_modified(|current| {
            if current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
    }

    async fn handle_event(&mut self, event: PlatformEvent) {
        debug!("Platform event: {:?}", event);
        match event {
            PlatformEvent::RadioStateChanged(enabled) => {
                info!("📶 Wi-Fi radio {}", if enabled { "enabled" } else { "disabled" });
                self.state.wifi_enabled = enabled;
                self.state.settings_redirect = false;
                if enabled {
                    self.request_scan().await;
                } else {
                    self.state.scan_results = None;
                    self.state.current_connection = None;
                    self.orchestrator.reset();
                }
            }
            PlatformEvent::ScanResultsAvailable => match self.platform.scan_results().await {
                Ok(records) => {
                    let ranked = reduce(&records, &self.scale);
                    info!(
                        "🔍 Scan finished: {} records, {} networks",
                        records.len(),
                        ranked.len()
                    );
                    self.state.scan_results = Some(ranked);
                }
                Err(e) => warn!("⚠️ Could not read scan results: {}", e),
            },
            PlatformEvent::CapabilitiesChanged {
                validated,
                transport,
                ssid,
            } => {
                if !validated {
                    return;
                }
                match transport {
                    Transport::Wifi => {
                        let ssid = match ssid {
                            Some(ssid) => Some(unquote(&ssid).to_owned()),
                            None => self.associated_ssid().await,
                        };
                        match ssid {
                            Some(ssid) => {
                                info!("✅ Wi-Fi connected to '{}'", ssid);
                                self.orchestrator.on_network_validated(&ssid);
                                self.state.current_connection = Some(CurrentConnection { ssid });
                                self.request_scan().await;
                            }
                            None => warn!("⚠️ Wi-Fi validated but the network is unknown"),
                        }
                    }
                    Transport::Cellular => info!("📱 Cellular data connected"),
                    Transport::Other => debug!("Other transport validated"),
                }
            }
            PlatformEvent::SuggestionPostConnection { ssid } => {
                info!("🤝 Post-connection notice for '{}'", ssid);
                self.request_scan().await;
            }
            PlatformEvent::SuggestionRejected { ssid, reason } => {
                self.orchestrator.on_rejected(&ssid, &reason);
            }
            PlatformEvent::ConnectTimedOut { ssid } => {
                self.orchestrator.on_timed_out(&ssid);
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        debug!("Command: {:?}", command);
        let result = match command {
            Command::Connect {
                ssid,
                bssid,
                credential,
            } => match self.find_network(&ssid, bssid.as_deref()) {
                Some(network) => self.orchestrator.connect(network, credential).await,
                None => Err(Error::NoMatchingNetwork(ssid)),
            },
            Command::ProvideCredential(secret) => self.orchestrator.provide_credential(&secret).await,
            Command::DismissCredential => {
                self.orchestrator.dismiss_credential();
                Ok(())
            }
            Command::SetWifiEnabled(enabled) => self.toggle_radio(enabled).await,
            Command::RequestScan => {
                self.request_scan().await;
                Ok(())
            }
            Command::Forget { ssid } => self.platform.remove(&ssid).await,
        };

        if let Err(e) = result {
            warn!("⚠️ {}", e);
        }
    }

    async fn toggle_radio(&mut self, enabled: bool) -> Result<()> {
        match self.tier.radio_toggle(enabled) {
            RadioToggle::Direct(enabled) => match self.platform.set_wifi_enabled(enabled).await {
                Err(Error::RadioToggleUnsupported) => self.open_settings().await,
                other => other,
            },
            RadioToggle::OpenSettings => self.open_settings().await,
        }
    }

    async fn open_settings(&mut self) -> Result<()> {
        info!("⚙️ Radio toggle redirected to the Wi-Fi settings surface");
        self.platform.open_wifi_settings().await?;
        self.state.settings_redirect = true;
        Ok(())
    }

    async fn request_scan(&self) {
        if let Err(e) = self.platform.request_scan().await {
            warn!("⚠️ Scan request failed: {}", e);
        }
    }

    async fn associated_ssid(&self) -> Option<String> {
        match self.platform.connection_info().await {
            Ok(info) => info.map(|i| unquote(&i.ssid).to_owned()),
            Err(e) => {
                warn!("⚠️ Could not read connection info: {}", e);
                None
            }
        }
    }

    fn find_network(&self, ssid: &str, bssid: Option<&str>) -> Option<RankedNetwork> {
        self.state
            .scan_results
            .as_ref()?
            .iter()
            .find(|n| n.ssid == ssid && bssid.is_none_or(|b| n.bssid == b))
            .cloned()
    }
}

/// Some platforms report the ssid wrapped in double quotes.
fn unquote(ssid: &str) -> &str {
    ssid.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(ssid)
}
