use crate::traits::{
    ConnectionRequest, EventSink, FeatureTier, PlatformEvent, SavedNetwork, ScanRecord,
    SubmitStatus, Transport, WifiInfo, WifiPlatform,
};
use crate::{Error, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct MockState {
    wifi_enabled: bool,
    records: Vec<ScanRecord>,
    connection: Option<WifiInfo>,
    saved: Vec<SavedNetwork>,
    submit_status: Option<SubmitStatus>,
    fail_queries: bool,
    auto_validate: bool,
    refuse_radio_toggle: bool,
    sink: Option<EventSink>,

    submitted: Vec<ConnectionRequest>,
    activated: Vec<ConnectionRequest>,
    removed: Vec<String>,
    scan_requests: usize,
    settings_opened: usize,
}

/// An in-memory platform for tests and local development.
/// It simulates scanning and connecting without any real hardware interaction,
/// and records every command it receives.
#[derive(Debug)]
pub struct MockPlatform {
    tier: FeatureTier,
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new(tier: FeatureTier) -> Self {
        Self {
            tier,
            state: Mutex::new(MockState {
                wifi_enabled: true,
                ..Default::default()
            }),
        }
    }

    /// A handful of fake networks, with duplicates across bands.
    pub fn with_demo_networks(self) -> Self {
        let rec = |ssid: &str, caps: &str, rssi: i32, bssid: &str| ScanRecord {
            ssid: ssid.into(),
            capabilities: caps.into(),
            rssi,
            bssid: bssid.into(),
        };
        self.with_scan_results(vec![
            rec("MyHomeWiFi", "[WPA3-SAE-CCMP][ESS]", -48, "02:00:00:00:00:01"),
            rec("MyHomeWiFi", "[WPA3-SAE-CCMP][ESS]", -71, "02:00:00:00:00:02"),
            rec("CafeGuest", "[ESS]", -62, "02:00:00:00:01:01"),
            rec("Neighbor's Network", "[WPA2-PSK-CCMP][ESS]", -80, "02:00:00:00:02:01"),
            rec("xfinitywifi", "[WPA2-PSK-CCMP][WPS][ESS]", -58, "02:00:00:00:03:01"),
            rec("OldRouter", "[WEP][ESS]", -90, "02:00:00:00:04:01"),
            rec("", "[ESS]", -40, "02:00:00:00:05:01"),
        ])
    }

    pub fn with_scan_results(mut self, records: Vec<ScanRecord>) -> Self {
        self.state.get_mut().records = records;
        self
    }

    pub fn with_saved(mut self, saved: Vec<SavedNetwork>) -> Self {
        self.state.get_mut().saved = saved;
        self
    }

    pub fn with_wifi_enabled(mut self, enabled: bool) -> Self {
        self.state.get_mut().wifi_enabled = enabled;
        self
    }

    pub fn with_connection(mut self, ssid: &str) -> Self {
        self.state.get_mut().connection = Some(WifiInfo {
            ssid: ssid.into(),
            bssid: None,
        });
        self
    }

    /// Status returned by every subsequent `submit`.
    pub fn with_submit_status(mut self, status: SubmitStatus) -> Self {
        self.state.get_mut().submit_status = Some(status);
        self
    }

    /// Accepted submissions associate right away and report a validated network.
    pub fn with_auto_validate(mut self) -> Self {
        self.state.get_mut().auto_validate = true;
        self
    }

    /// Every query fails as if the permission had been revoked.
    pub fn with_failing_queries(mut self) -> Self {
        self.state.get_mut().fail_queries = true;
        self
    }

    /// Radio toggling is refused as on platforms that reserve it for settings.
    pub fn with_radio_toggle_refused(mut self) -> Self {
        self.state.get_mut().refuse_radio_toggle = true;
        self
    }

    pub async fn set_scan_results(&self, records: Vec<ScanRecord>) {
        self.state.lock().await.records = records;
    }

    pub async fn set_connection(&self, info: Option<WifiInfo>) {
        self.state.lock().await.connection = info;
    }

    /// Delivers `event` through the registered sink, as the OS would.
    pub async fn emit(&self, event: PlatformEvent) -> Result<()> {
        let sink = self.state.lock().await.sink.clone();
        match sink {
            Some(sink) => sink.emit(event),
            None => Err(Error::CommandFailed("no event registration".into())),
        }
    }

    pub async fn is_registered(&self) -> bool {
        self.state.lock().await.sink.is_some()
    }

    pub async fn submitted(&self) -> Vec<ConnectionRequest> {
        self.state.lock().await.submitted.clone()
    }

    pub async fn activated(&self) -> Vec<ConnectionRequest> {
        self.state.lock().await.activated.clone()
    }

    pub async fn removed(&self) -> Vec<String> {
        self.state.lock().await.removed.clone()
    }

    pub async fn scan_requests(&self) -> usize {
        self.state.lock().await.scan_requests
    }

    pub async fn settings_opened(&self) -> usize {
        self.state.lock().await.settings_opened
    }

    async fn check_queries(&self) -> Result<()> {
        if self.state.lock().await.fail_queries {
            return Err(Error::PermissionDenied("mock query refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WifiPlatform for MockPlatform {
    fn feature_tier(&self) -> FeatureTier {
        self.tier
    }

    async fn register(&self, sink: EventSink) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.sink.is_some() {
            return Err(Error::AlreadyRegistered);
        }
        state.sink = Some(sink);
        debug!("🤖 [MockPlatform] Event sink registered");
        Ok(())
    }

    async fn unregister(&self) -> Result<()> {
        self.state.lock().await.sink = None;
        debug!("🤖 [MockPlatform] Event sink removed");
        Ok(())
    }

    async fn is_wifi_enabled(&self) -> Result<bool> {
        self.check_queries().await?;
        Ok(self.state.lock().await.wifi_enabled)
    }

    async fn scan_results(&self) -> Result<Vec<ScanRecord>> {
        self.check_queries().await?;
        let state = self.state.lock().await;
        if !state.wifi_enabled {
            return Ok(Vec::new());
        }
        Ok(state.records.clone())
    }

    async fn connection_info(&self) -> Result<Option<WifiInfo>> {
        self.check_queries().await?;
        Ok(self.state.lock().await.connection.clone())
    }

    async fn saved_networks(&self) -> Result<Vec<SavedNetwork>> {
        self.check_queries().await?;
        Ok(self.state.lock().await.saved.clone())
    }

    async fn set_wifi_enabled(&self, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.refuse_radio_toggle {
            return Err(Error::RadioToggleUnsupported);
        }
        if state.wifi_enabled == enabled {
            return Ok(());
        }
        state.wifi_enabled = enabled;
        if !enabled {
            state.connection = None;
        }
        if let Some(sink) = &state.sink {
            sink.emit(PlatformEvent::RadioStateChanged(enabled))?;
        }
        Ok(())
    }

    async fn open_wifi_settings(&self) -> Result<()> {
        self.state.lock().await.settings_opened += 1;
        Ok(())
    }

    async fn request_scan(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.scan_requests += 1;
        if state.wifi_enabled {
            if let Some(sink) = &state.sink {
                sink.emit(PlatformEvent::ScanResultsAvailable)?;
            }
        }
        Ok(())
    }

    async fn submit(&self, request: &ConnectionRequest) -> Result<SubmitStatus> {
        let mut state = self.state.lock().await;
        debug!("🤖 [MockPlatform] submit for '{}'", request.ssid());
        state.submitted.push(request.clone());
        let status = state.submit_status.clone().unwrap_or(SubmitStatus::Accepted);
        if state.auto_validate && !matches!(status, SubmitStatus::Rejected(_)) {
            let ssid = request.ssid().to_owned();
            state.connection = Some(WifiInfo {
                ssid: ssid.clone(),
                bssid: None,
            });
            if let Some(sink) = &state.sink {
                sink.emit(PlatformEvent::CapabilitiesChanged {
                    validated: true,
                    transport: Transport::Wifi,
                    ssid: Some(ssid),
                })?;
            }
        }
        Ok(status)
    }

    async fn activate(&self, request: &ConnectionRequest) -> Result<()> {
        self.state.lock().await.activated.push(request.clone());
        Ok(())
    }

    async fn remove(&self, ssid: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.saved.retain(|s| s.ssid != ssid);
        state.removed.push(ssid.to_owned());
        Ok(())
    }
}
