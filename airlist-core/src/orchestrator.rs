use crate::tier::ConnectTier;
use crate::traits::{ConnectionRequest, RankedNetwork, SavedNetwork, SubmitStatus, WifiPlatform};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress of the current connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectPhase {
    Idle,
    AwaitingCredential { ssid: String },
    Submitting { ssid: String },
    Connected { ssid: String },
    Failed { ssid: String, reason: String },
}

/// Connection policy: decides between connecting straight away, reusing a
/// saved entry, or asking for a credential, and tracks the outcome.
pub struct Orchestrator {
    platform: Arc<dyn WifiPlatform>,
    tier: Arc<dyn ConnectTier>,
    phase: ConnectPhase,
    pending: Option<RankedNetwork>,
}

impl Orchestrator {
    pub fn new(platform: Arc<dyn WifiPlatform>, tier: Arc<dyn ConnectTier>) -> Self {
        Self {
            platform,
            tier,
            phase: ConnectPhase::Idle,
            pending: None,
        }
    }

    pub fn phase(&self) -> &ConnectPhase {
        &self.phase
    }

    /// Starts a connection attempt, replacing any attempt in progress.
    pub async fn connect(&mut self, network: RankedNetwork, credential: Option<String>) -> Result<()> {
        self.pending = None;

        if !network.cipher.requires_credential() {
            let request = self.tier.build_request(&network, None);
            return self.submit(request).await;
        }

        if let Some(secret) = credential {
            let request = self.tier.build_request(&network, Some(&secret));
            return self.submit(request).await;
        }

        if let Some(saved) = self.find_saved(&network.ssid).await {
            info!("🔁 Reusing saved entry '{}' for '{}'", saved.id, saved.ssid);
            return self.submit(ConnectionRequest::Saved(saved)).await;
        }

        info!("🔑 '{}' needs a credential", network.ssid);
        self.phase = ConnectPhase::AwaitingCredential {
            ssid: network.ssid.clone(),
        };
        self.pending = Some(network);
        Ok(())
    }

    /// Completes an attempt parked in `AwaitingCredential`.
    pub async fn provide_credential(&mut self, secret: &str) -> Result<()> {
        let network = match (&self.phase, self.pending.take()) {
            (ConnectPhase::AwaitingCredential { .. }, Some(network)) => network,
            _ => {
                return Err(Error::CommandFailed(
                    "no connection is waiting for a credential".into(),
                ));
            }
        };
        let request = self.tier.build_request(&network, Some(secret));
        self.submit(request).await
    }

    /// The credential prompt was closed without an answer.
    pub fn dismiss_credential(&mut self) {
        if matches!(self.phase, ConnectPhase::AwaitingCredential { .. }) {
            self.pending = None;
            self.phase = ConnectPhase::Idle;
        }
    }

    /// Drops whatever attempt is in progress (radio switched off).
    pub fn reset(&mut self) {
        self.pending = None;
        self.phase = ConnectPhase::Idle;
    }

    /// Validated Wi-Fi transport came up for `ssid`.
    ///
    /// An attempt in flight only completes when `ssid` is the network being
    /// submitted; another network validating leaves it pending.
    pub fn on_network_validated(&mut self, ssid: &str) {
        match &self.phase {
            ConnectPhase::AwaitingCredential { .. } => {
                debug!("Validated '{}' while a credential prompt is open", ssid);
                return;
            }
            ConnectPhase::Submitting { ssid: pending } if pending != ssid => {
                debug!("Validated '{}' while '{}' is still submitting", ssid, pending);
                return;
            }
            _ => {}
        }
        self.phase = ConnectPhase::Connected { ssid: ssid.to_owned() };
    }

    /// The platform declined the suggestion for `ssid`.
    pub fn on_rejected(&mut self, ssid: &str, reason: &str) {
        self.fail_if_submitting(ssid, reason);
    }

    pub fn on_timed_out(&mut self, ssid: &str) {
        self.fail_if_submitting(ssid, "timed out");
    }

    fn fail_if_submitting(&mut self, ssid: &str, reason: &str) {
        let current = matches!(&self.phase, ConnectPhase::Submitting { ssid: s } if s == ssid);
        if !current {
            debug!("Ignoring stale failure for '{}'", ssid);
            return;
        }
        warn!("❌ Connection to '{}' failed: {}", ssid, reason);
        self.phase = ConnectPhase::Failed {
            ssid: ssid.to_owned(),
            reason: reason.to_owned(),
        };
    }

    async fn find_saved(&self, ssid: &str) -> Option<SavedNetwork> {
        match self.platform.saved_networks().await {
            Ok(saved) => saved.into_iter().find(|s| s.ssid == ssid),
            Err(e) => {
                warn!("⚠️ Could not list saved networks: {}", e);
                None
            }
        }
    }

    async fn submit(&mut self, request: ConnectionRequest) -> Result<()> {
        let ssid = request.ssid().to_owned();
        self.phase = ConnectPhase::Submitting { ssid: ssid.clone() };
        info!("📡 Submitting connection request for '{}'", ssid);

        let status = match self.platform.submit(&request).await {
            Ok(status) => status,
            Err(e) => {
                self.fail_if_submitting(&ssid, &e.to_string());
                return Err(e);
            }
        };

        match status {
            SubmitStatus::Accepted | SubmitStatus::Duplicate if self.tier.activates_after_submit() => {
                if status == SubmitStatus::Duplicate {
                    debug!("Suggestion for '{}' already known, activating anyway", ssid);
                }
                if let Err(e) = self.platform.activate(&request).await {
                    self.fail_if_submitting(&ssid, &e.to_string());
                    return Err(e);
                }
                Ok(())
            }
            SubmitStatus::Accepted | SubmitStatus::Duplicate => Ok(()),
            SubmitStatus::Rejected(reason) => {
                self.fail_if_submitting(&ssid, &reason);
                Err(Error::SuggestionRejected(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockPlatform;
    use crate::cipher::CipherType;
    use crate::tier::{ProfileTier, SuggestionTier};
    use crate::traits::{FeatureTier, Passphrase};

    fn network(ssid: &str, cipher: CipherType, caps: &str) -> RankedNetwork {
        RankedNetwork {
            ssid: ssid.into(),
            cipher,
            signal_level: 3,
            rssi: -60,
            bssid: "aa:bb:cc:dd:ee:ff".into(),
            capabilities: caps.into(),
        }
    }

    fn suggestion_orchestrator(platform: &Arc<MockPlatform>) -> Orchestrator {
        Orchestrator::new(platform.clone(), Arc::new(SuggestionTier))
    }

    #[tokio::test]
    async fn open_network_submits_once_without_credential() {
        let platform = Arc::new(MockPlatform::new(FeatureTier::Suggestion));
        let mut orch = suggestion_orchestrator(&platform);

        orch.connect(network("Cafe", CipherType::Open, "[ESS]"), None)
            .await
            .unwrap();

        let submitted = platform.submitted().await;
        assert_eq!(submitted.len(), 1);
        let ConnectionRequest::Suggestion(s) = &submitted[0] else {
            panic!("expected suggestion");
        };
        assert_eq!(s.passphrase, None);
        assert_eq!(orch.phase(), &ConnectPhase::Submitting { ssid: "Cafe".into() });
    }

    #[tokio::test]
    async fn secured_network_without_credential_waits() {
        let platform = Arc::new(MockPlatform::new(FeatureTier::Suggestion));
        let mut orch = suggestion_orchestrator(&platform);

        orch.connect(network("Home", CipherType::WpaFamily, "[WPA2-PSK-CCMP]"), None)
            .await
            .unwrap();

        assert_eq!(
            orch.phase(),
            &ConnectPhase::AwaitingCredential { ssid: "Home".into() }
        );
        assert!(platform.submitted().await.is_empty());

        orch.provide_credential("hunter22").await.unwrap();
        let submitted = platform.submitted().await;
        assert_eq!(submitted.len(), 1);
        let ConnectionRequest::Suggestion(s) = &submitted[0] else {
            panic!("expected suggestion");
        };
        assert_eq!(s.passphrase, Some(Passphrase::Wpa2("hunter22".into())));
    }

    #[tokio::test]
    async fn saved_entry_is_reused_silently() {
        let platform = Arc::new(
            MockPlatform::new(FeatureTier::Profile).with_saved(vec![SavedNetwork {
                id: "7".into(),
                ssid: "Home".into(),
            }]),
        );
        let mut orch = Orchestrator::new(platform.clone(), Arc::new(ProfileTier));

        orch.connect(network("Home", CipherType::Wep, "[WEP][ESS]"), None)
            .await
            .unwrap();

        let submitted = platform.submitted().await;
        assert_eq!(submitted.len(), 1);
        assert!(matches!(submitted[0], ConnectionRequest::Saved(_)));
        assert_eq!(orch.phase(), &ConnectPhase::Submitting { ssid: "Home".into() });
    }

    #[tokio::test]
    async fn duplicate_suggestion_is_followed_by_activation() {
        let platform =
            Arc::new(MockPlatform::new(FeatureTier::Suggestion).with_submit_status(SubmitStatus::Duplicate));
        let mut orch = suggestion_orchestrator(&platform);

        orch.connect(network("Cafe", CipherType::Open, "[ESS]"), None)
            .await
            .unwrap();

        assert_eq!(platform.submitted().await.len(), 1);
        assert_eq!(platform.activated().await.len(), 1);
    }

    #[tokio::test]
    async fn profile_tier_does_not_activate() {
        let platform = Arc::new(MockPlatform::new(FeatureTier::Profile));
        let mut orch = Orchestrator::new(platform.clone(), Arc::new(ProfileTier));

        orch.connect(network("Cafe", CipherType::Open, "[ESS]"), None)
            .await
            .unwrap();

        assert_eq!(platform.submitted().await.len(), 1);
        assert!(platform.activated().await.is_empty());
    }

    #[tokio::test]
    async fn rejection_fails_once() {
        let platform = Arc::new(
            MockPlatform::new(FeatureTier::Suggestion)
                .with_submit_status(SubmitStatus::Rejected("app disallowed".into())),
        );
        let mut orch = suggestion_orchestrator(&platform);

        let err = orch
            .connect(network("Cafe", CipherType::Open, "[ESS]"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SuggestionRejected(_)));
        assert_eq!(
            orch.phase(),
            &ConnectPhase::Failed {
                ssid: "Cafe".into(),
                reason: "app disallowed".into()
            }
        );
        assert_eq!(platform.submitted().await.len(), 1);
        assert!(platform.activated().await.is_empty());
    }

    #[tokio::test]
    async fn validated_event_connects_and_stale_failures_are_ignored() {
        let platform = Arc::new(MockPlatform::new(FeatureTier::Suggestion));
        let mut orch = suggestion_orchestrator(&platform);

        orch.connect(network("Cafe", CipherType::Open, "[ESS]"), None)
            .await
            .unwrap();
        orch.on_timed_out("Elsewhere");
        assert_eq!(orch.phase(), &ConnectPhase::Submitting { ssid: "Cafe".into() });

        orch.on_network_validated("Cafe");
        assert_eq!(orch.phase(), &ConnectPhase::Connected { ssid: "Cafe".into() });

        orch.on_rejected("Cafe", "late");
        assert_eq!(orch.phase(), &ConnectPhase::Connected { ssid: "Cafe".into() });
    }

    #[tokio::test]
    async fn other_network_validating_keeps_attempt_pending() {
        let platform = Arc::new(MockPlatform::new(FeatureTier::Suggestion));
        let mut orch = suggestion_orchestrator(&platform);
        orch.connect(network("Cafe", CipherType::Open, "[ESS]"), None)
            .await
            .unwrap();

        orch.on_network_validated("Home");
        assert_eq!(orch.phase(), &ConnectPhase::Submitting { ssid: "Cafe".into() });

        orch.on_rejected("Cafe", "blocked");
        assert_eq!(
            orch.phase(),
            &ConnectPhase::Failed {
                ssid: "Cafe".into(),
                reason: "blocked".into(),
            }
        );
    }

    #[tokio::test]
    async fn dismiss_and_unexpected_credential() {
        let platform = Arc::new(MockPlatform::new(FeatureTier::Suggestion));
        let mut orch = suggestion_orchestrator(&platform);

        assert!(orch.provide_credential("nope").await.is_err());

        orch.connect(network("Home", CipherType::WpaFamily, "[WPA2-PSK]"), None)
            .await
            .unwrap();
        orch.dismiss_credential();
        assert_eq!(orch.phase(), &ConnectPhase::Idle);
        assert!(orch.provide_credential("late").await.is_err());
        assert!(platform.submitted().await.is_empty());
    }
}
