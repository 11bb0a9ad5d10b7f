use airlist_core::Error;
use airlist_core::backends::mock::MockPlatform;
use airlist_core::cipher::CipherType;
use airlist_core::context::{ContextOptions, WifiContext};
use airlist_core::orchestrator::ConnectPhase;
use airlist_core::reactor::{Command, ConnectionState};
use airlist_core::traits::{
    ConnectionRequest, FeatureTier, KeyManagement, NetworkProfile, Passphrase, PlatformEvent,
    SavedNetwork, ScanRecord, SubmitStatus, Transport, WifiPlatform,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

async fn wait_until<F>(rx: &mut watch::Receiver<ConnectionState>, pred: F) -> ConnectionState
where
    F: FnMut(&ConnectionState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("reactor stopped")
        .clone()
}

async fn start(platform: &Arc<MockPlatform>) -> (WifiContext, watch::Receiver<ConnectionState>) {
    let ctx = WifiContext::start(platform.clone(), ContextOptions::default())
        .await
        .unwrap();
    let mut rx = ctx.subscribe();
    wait_until(&mut rx, |s| s.scan_results.is_some()).await;
    (ctx, rx)
}

fn connect(ssid: &str, credential: Option<&str>) -> Command {
    Command::Connect {
        ssid: ssid.into(),
        bssid: None,
        credential: credential.map(String::from),
    }
}

#[tokio::test]
async fn startup_publishes_ranked_results_and_current_network() {
    let platform = Arc::new(
        MockPlatform::new(FeatureTier::Profile)
            .with_demo_networks()
            .with_connection("\"MyHomeWiFi\""),
    );
    let (ctx, _rx) = start(&platform).await;

    let state = ctx.snapshot();
    assert!(state.wifi_enabled);
    assert_eq!(
        state.current_connection.map(|c| c.ssid).as_deref(),
        Some("MyHomeWiFi")
    );

    let results = state.scan_results.unwrap();
    let names: Vec<&str> = results.iter().map(|n| n.ssid.as_str()).collect();
    assert_eq!(
        names,
        ["MyHomeWiFi", "CafeGuest", "xfinitywifi", "Neighbor's Network", "OldRouter"]
    );
    assert_eq!(results[0].rssi, -48);
    assert_eq!(results[0].signal_level, 4);
    assert_eq!(results[1].cipher, CipherType::Open);
    assert_eq!(results[4].cipher, CipherType::Wep);

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn radio_off_clears_results_on_profile_tier() {
    let platform = Arc::new(MockPlatform::new(FeatureTier::Profile).with_demo_networks());
    let (ctx, mut rx) = start(&platform).await;

    ctx.commands().send(Command::SetWifiEnabled(false)).unwrap();
    let state = wait_until(&mut rx, |s| !s.wifi_enabled).await;
    assert!(state.scan_results.is_none());
    assert!(state.current_connection.is_none());
    assert!(!state.settings_redirect);

    ctx.commands().send(Command::SetWifiEnabled(true)).unwrap();
    let state = wait_until(&mut rx, |s| s.wifi_enabled && s.scan_results.is_some()).await;
    assert_eq!(state.scan_results.unwrap().len(), 5);

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn suggestion_tier_redirects_radio_toggle_to_settings() {
    let platform = Arc::new(MockPlatform::new(FeatureTier::Suggestion).with_demo_networks());
    let (ctx, mut rx) = start(&platform).await;

    ctx.commands().send(Command::SetWifiEnabled(false)).unwrap();
    let state = wait_until(&mut rx, |s| s.settings_redirect).await;
    assert!(state.wifi_enabled);
    assert_eq!(platform.settings_opened().await, 1);

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn only_one_context_per_platform() {
    let platform = Arc::new(MockPlatform::new(FeatureTier::Profile));
    let ctx = WifiContext::start(platform.clone(), ContextOptions::default())
        .await
        .unwrap();

    let second = WifiContext::start(platform.clone(), ContextOptions::default()).await;
    assert!(matches!(second, Err(Error::AlreadyRegistered)));

    ctx.shutdown().await.unwrap();
    assert!(!platform.is_registered().await);

    let again = WifiContext::start(platform.clone(), ContextOptions::default())
        .await
        .unwrap();
    again.shutdown().await.unwrap();
}

#[tokio::test]
async fn dropped_context_releases_the_registration() {
    let platform = Arc::new(MockPlatform::new(FeatureTier::Profile).with_demo_networks());
    let (ctx, _rx) = start(&platform).await;
    drop(ctx);

    tokio::time::timeout(Duration::from_secs(2), async {
        while platform.is_registered().await {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("registration still held after drop");

    let (again, _rx) = start(&platform).await;
    again.shutdown().await.unwrap();
}

#[tokio::test]
async fn refused_radio_toggle_falls_back_to_settings() {
    let platform = Arc::new(
        MockPlatform::new(FeatureTier::Profile)
            .with_demo_networks()
            .with_radio_toggle_refused(),
    );
    let (ctx, mut rx) = start(&platform).await;

    ctx.commands().send(Command::SetWifiEnabled(false)).unwrap();
    let state = wait_until(&mut rx, |s| s.settings_redirect).await;
    assert!(state.wifi_enabled);
    assert!(state.scan_results.is_some());
    assert_eq!(platform.settings_opened().await, 1);

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn tier_override_wins_over_platform() {
    let platform = Arc::new(MockPlatform::new(FeatureTier::Profile));
    let options = ContextOptions {
        tier: Some(FeatureTier::Suggestion),
        ..Default::default()
    };
    let ctx = WifiContext::start(platform, options).await.unwrap();
    assert_eq!(ctx.tier(), FeatureTier::Suggestion);
    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn secured_network_waits_for_credential_then_connects() {
    let platform = Arc::new(
        MockPlatform::new(FeatureTier::Suggestion)
            .with_demo_networks()
            .with_auto_validate(),
    );
    let (ctx, mut rx) = start(&platform).await;

    ctx.commands().send(connect("MyHomeWiFi", None)).unwrap();
    wait_until(&mut rx, |s| {
        matches!(&s.phase, ConnectPhase::AwaitingCredential { ssid } if ssid == "MyHomeWiFi")
    })
    .await;
    assert!(platform.submitted().await.is_empty());

    ctx.commands()
        .send(Command::ProvideCredential("hunter22".into()))
        .unwrap();
    let state = wait_until(&mut rx, |s| matches!(s.phase, ConnectPhase::Connected { .. })).await;
    assert_eq!(
        state.current_connection.map(|c| c.ssid).as_deref(),
        Some("MyHomeWiFi")
    );

    let submitted = platform.submitted().await;
    assert_eq!(submitted.len(), 1);
    match &submitted[0] {
        ConnectionRequest::Suggestion(s) => {
            assert_eq!(s.bssid, "02:00:00:00:00:01");
            assert_eq!(s.passphrase, Some(Passphrase::Wpa3("hunter22".into())));
        }
        other => panic!("expected a suggestion, got {:?}", other),
    }
    assert_eq!(platform.activated().await.len(), 1);

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn dismissing_the_prompt_returns_to_idle() {
    let platform = Arc::new(MockPlatform::new(FeatureTier::Profile).with_demo_networks());
    let (ctx, mut rx) = start(&platform).await;

    ctx.commands().send(connect("xfinitywifi", None)).unwrap();
    wait_until(&mut rx, |s| matches!(s.phase, ConnectPhase::AwaitingCredential { .. })).await;

    ctx.commands().send(Command::DismissCredential).unwrap();
    wait_until(&mut rx, |s| s.phase == ConnectPhase::Idle).await;
    assert!(platform.submitted().await.is_empty());

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn saved_entry_is_reused_without_prompt() {
    let platform = Arc::new(
        MockPlatform::new(FeatureTier::Profile)
            .with_demo_networks()
            .with_saved(vec![SavedNetwork {
                id: "uuid-7".into(),
                ssid: "Neighbor's Network".into(),
            }]),
    );
    let (ctx, mut rx) = start(&platform).await;

    ctx.commands().send(connect("Neighbor's Network", None)).unwrap();
    wait_until(&mut rx, |s| matches!(s.phase, ConnectPhase::Submitting { .. })).await;
    assert!(matches!(
        platform.submitted().await.as_slice(),
        [ConnectionRequest::Saved(saved)] if saved.id == "uuid-7"
    ));

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_network_leaves_state_unchanged() {
    let platform = Arc::new(MockPlatform::new(FeatureTier::Profile).with_demo_networks());
    let (ctx, mut rx) = start(&platform).await;

    ctx.commands().send(connect("Nowhere", None)).unwrap();
    ctx.commands().send(connect("CafeGuest", None)).unwrap();
    wait_until(&mut rx, |s| {
        matches!(&s.phase, ConnectPhase::Submitting { ssid } if ssid == "CafeGuest")
    })
    .await;

    let submitted = platform.submitted().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].ssid(), "CafeGuest");

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejected_suggestion_fails_the_attempt() {
    let platform = Arc::new(
        MockPlatform::new(FeatureTier::Suggestion)
            .with_demo_networks()
            .with_submit_status(SubmitStatus::Rejected("quota exceeded".into())),
    );
    let (ctx, mut rx) = start(&platform).await;

    ctx.commands().send(connect("CafeGuest", None)).unwrap();
    let state = wait_until(&mut rx, |s| matches!(s.phase, ConnectPhase::Failed { .. })).await;
    assert_eq!(
        state.phase,
        ConnectPhase::Failed {
            ssid: "CafeGuest".into(),
            reason: "quota exceeded".into(),
        }
    );
    assert!(platform.activated().await.is_empty());

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn duplicate_suggestion_still_activates() {
    let platform = Arc::new(
        MockPlatform::new(FeatureTier::Suggestion)
            .with_demo_networks()
            .with_submit_status(SubmitStatus::Duplicate),
    );
    let (ctx, mut rx) = start(&platform).await;

    ctx.commands().send(connect("CafeGuest", None)).unwrap();
    wait_until(&mut rx, |s| matches!(s.phase, ConnectPhase::Submitting { .. })).await;
    ctx.shutdown().await.unwrap();

    assert_eq!(platform.activated().await.len(), 1);
}

#[tokio::test]
async fn late_platform_events_drive_the_attempt() {
    let platform = Arc::new(MockPlatform::new(FeatureTier::Profile).with_demo_networks());
    let (ctx, mut rx) = start(&platform).await;

    ctx.commands().send(connect("CafeGuest", None)).unwrap();
    wait_until(&mut rx, |s| matches!(s.phase, ConnectPhase::Submitting { .. })).await;

    // A timeout for another network is stale and ignored.
    platform
        .emit(PlatformEvent::ConnectTimedOut {
            ssid: "OldRouter".into(),
        })
        .await
        .unwrap();
    platform
        .emit(PlatformEvent::ConnectTimedOut {
            ssid: "CafeGuest".into(),
        })
        .await
        .unwrap();
    let state = wait_until(&mut rx, |s| matches!(s.phase, ConnectPhase::Failed { .. })).await;
    assert!(matches!(state.phase, ConnectPhase::Failed { ssid, .. } if ssid == "CafeGuest"));

    platform
        .emit(PlatformEvent::CapabilitiesChanged {
            validated: true,
            transport: Transport::Wifi,
            ssid: Some("\"CafeGuest\"".into()),
        })
        .await
        .unwrap();
    let state = wait_until(&mut rx, |s| s.current_connection.is_some()).await;
    assert_eq!(state.current_connection.unwrap().ssid, "CafeGuest");
    assert_eq!(
        state.phase,
        ConnectPhase::Connected {
            ssid: "CafeGuest".into()
        }
    );

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn other_network_validating_keeps_the_attempt_pending() {
    let platform = Arc::new(MockPlatform::new(FeatureTier::Profile).with_demo_networks());
    let (ctx, mut rx) = start(&platform).await;

    ctx.commands().send(connect("CafeGuest", None)).unwrap();
    wait_until(&mut rx, |s| matches!(s.phase, ConnectPhase::Submitting { .. })).await;

    // The device roams back to a known network before the new one comes up.
    platform
        .emit(PlatformEvent::CapabilitiesChanged {
            validated: true,
            transport: Transport::Wifi,
            ssid: Some("\"MyHomeWiFi\"".into()),
        })
        .await
        .unwrap();
    let state = wait_until(&mut rx, |s| {
        s.current_connection.as_ref().map(|c| c.ssid.as_str()) == Some("MyHomeWiFi")
    })
    .await;
    assert_eq!(
        state.phase,
        ConnectPhase::Submitting {
            ssid: "CafeGuest".into()
        }
    );

    platform
        .emit(PlatformEvent::SuggestionRejected {
            ssid: "CafeGuest".into(),
            reason: "auth failed".into(),
        })
        .await
        .unwrap();
    let state = wait_until(&mut rx, |s| matches!(s.phase, ConnectPhase::Failed { .. })).await;
    assert!(matches!(state.phase, ConnectPhase::Failed { ssid, .. } if ssid == "CafeGuest"));

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn unclassified_network_connects_without_prompt() {
    let platform = Arc::new(
        MockPlatform::new(FeatureTier::Profile).with_scan_results(vec![ScanRecord {
            ssid: "Mystery".into(),
            capabilities: String::new(),
            rssi: -60,
            bssid: "02:00:00:00:00:09".into(),
        }]),
    );
    let (ctx, mut rx) = start(&platform).await;
    let results = ctx.snapshot().scan_results.unwrap();
    assert_eq!(results[0].cipher, CipherType::Invalid);

    ctx.commands().send(connect("Mystery", None)).unwrap();
    let state = wait_until(&mut rx, |s| !matches!(s.phase, ConnectPhase::Idle)).await;
    assert_eq!(
        state.phase,
        ConnectPhase::Submitting {
            ssid: "Mystery".into()
        }
    );
    ctx.shutdown().await.unwrap();

    assert_eq!(
        platform.submitted().await,
        [ConnectionRequest::Profile(NetworkProfile {
            ssid: "Mystery".into(),
            key_mgmt: KeyManagement::None,
            secret: None,
        })]
    );
}

#[tokio::test]
async fn cellular_validation_does_not_touch_wifi_state() {
    let platform = Arc::new(MockPlatform::new(FeatureTier::Profile).with_demo_networks());
    let (ctx, rx) = start(&platform).await;
    let before = ctx.snapshot();

    platform
        .emit(PlatformEvent::CapabilitiesChanged {
            validated: true,
            transport: Transport::Cellular,
            ssid: None,
        })
        .await
        .unwrap();
    ctx.shutdown().await.unwrap();

    assert_eq!(*rx.borrow(), before);
}

#[tokio::test]
async fn refused_queries_degrade_silently() {
    let platform = Arc::new(
        MockPlatform::new(FeatureTier::Profile)
            .with_demo_networks()
            .with_failing_queries(),
    );
    let ctx = WifiContext::start(platform.clone(), ContextOptions::default())
        .await
        .unwrap();
    let rx = ctx.subscribe();

    platform
        .emit(PlatformEvent::RadioStateChanged(true))
        .await
        .unwrap();
    ctx.shutdown().await.unwrap();

    let state = rx.borrow().clone();
    assert!(state.wifi_enabled);
    assert!(state.scan_results.is_none());
    assert!(platform.scan_requests().await >= 1);
}

#[tokio::test]
async fn forget_removes_the_entry() {
    let platform = Arc::new(
        MockPlatform::new(FeatureTier::Suggestion).with_saved(vec![SavedNetwork {
            id: "s-1".into(),
            ssid: "Home".into(),
        }]),
    );
    let ctx = WifiContext::start(platform.clone(), ContextOptions::default())
        .await
        .unwrap();

    ctx.commands()
        .send(Command::Forget {
            ssid: "Home".into(),
        })
        .unwrap();
    ctx.shutdown().await.unwrap();

    assert_eq!(platform.removed().await, ["Home"]);
    assert!(platform.saved_networks().await.unwrap().is_empty());
}
