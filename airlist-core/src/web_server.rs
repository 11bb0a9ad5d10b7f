use crate::context::CommandSender;
use crate::orchestrator::ConnectPhase;
use crate::reactor::{Command, ConnectionState};
use crate::traits::RankedNetwork;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

// The shared state for our web server: a command handle into the reactor
// and the receiving end of its snapshot channel.
pub type WebServerState = State<Arc<AppState>>;

pub struct AppState {
    pub commands: CommandSender,
    pub state: watch::Receiver<ConnectionState>,
}

/// One row of the network list as the UI renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkView {
    pub ssid: String,
    pub bssid: String,
    pub signal_level: u8,
    pub security: &'static str,
    pub requires_credential: bool,
}

impl From<&RankedNetwork> for NetworkView {
    fn from(n: &RankedNetwork) -> Self {
        Self {
            ssid: n.ssid.clone(),
            bssid: n.bssid.clone(),
            signal_level: n.signal_level,
            security: n.cipher.label(),
            requires_credential: n.cipher.requires_credential(),
        }
    }
}

/// Snapshot with the connected network split out of the available list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateView {
    pub wifi_enabled: bool,
    pub scanning: bool,
    pub connected_ssid: Option<String>,
    pub connected: Option<NetworkView>,
    pub available: Vec<NetworkView>,
    pub phase: ConnectPhase,
    pub settings_redirect: bool,
}

impl From<&ConnectionState> for StateView {
    fn from(s: &ConnectionState) -> Self {
        let connected_ssid = s.current_connection.as_ref().map(|c| c.ssid.clone());
        let results = s.scan_results.as_deref().unwrap_or_default();

        let is_current = |n: &RankedNetwork| connected_ssid.as_deref() == Some(n.ssid.as_str());
        let connected = results.iter().find(|&n| is_current(n)).map(NetworkView::from);
        let available = results
            .iter()
            .filter(|&n| !is_current(n))
            .map(NetworkView::from)
            .collect();

        Self {
            wifi_enabled: s.wifi_enabled,
            scanning: s.wifi_enabled && s.scan_results.is_none(),
            connected_ssid,
            connected,
            available,
            phase: s.phase.clone(),
            settings_redirect: s.settings_redirect,
        }
    }
}

pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/state", get(api_state))
        .route("/api/scan", post(api_scan))
        .route("/api/radio", post(api_radio))
        .route("/api/connect", post(api_connect))
        .route("/api/credential", post(api_credential))
        .route("/api/credential/dismiss", post(api_dismiss_credential))
        .route("/api/forget", post(api_forget))
        .with_state(app_state)
}

/// Starts the Axum web server.
///
/// # Returns
/// A `JoinHandle` for the server task.
pub fn start_web_server(
    addr: SocketAddr,
    commands: CommandSender,
    state: watch::Receiver<ConnectionState>,
) -> JoinHandle<Result<(), crate::Error>> {
    let app = router(Arc::new(AppState { commands, state }));

    info!("🌐 Web server listening on {}", addr);

    tokio::spawn(async move {
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app.into_make_service()).await?;
        Ok(())
    })
}

// --- Route Handlers ---

/// Every command is acknowledged before the reactor handles it; the outcome
/// shows up in a later snapshot.
fn dispatch(state: &AppState, command: Command) -> Response {
    match state.commands.send(command) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            warn!("⚠️ Dropping API command: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn api_state(State(state): WebServerState) -> Json<StateView> {
    Json(StateView::from(&*state.state.borrow()))
}

async fn api_scan(State(state): WebServerState) -> Response {
    dispatch(&state, Command::RequestScan)
}

#[derive(Deserialize)]
pub struct RadioRequest {
    enabled: bool,
}

async fn api_radio(State(state): WebServerState, Json(payload): Json<RadioRequest>) -> Response {
    dispatch(&state, Command::SetWifiEnabled(payload.enabled))
}

#[derive(Deserialize)]
pub struct ConnectRequest {
    ssid: String,
    #[serde(default)]
    bssid: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

async fn api_connect(
    State(state): WebServerState,
    Json(payload): Json<ConnectRequest>,
) -> Response {
    dispatch(
        &state,
        Command::Connect {
            ssid: payload.ssid,
            bssid: payload.bssid,
            credential: payload.password.filter(|p| !p.is_empty()),
        },
    )
}

#[derive(Deserialize)]
pub struct CredentialRequest {
    password: String,
}

async fn api_credential(
    State(state): WebServerState,
    Json(payload): Json<CredentialRequest>,
) -> Response {
    dispatch(&state, Command::ProvideCredential(payload.password))
}

async fn api_dismiss_credential(State(state): WebServerState) -> Response {
    dispatch(&state, Command::DismissCredential)
}

#[derive(Deserialize)]
pub struct ForgetRequest {
    ssid: String,
}

async fn api_forget(State(state): WebServerState, Json(payload): Json<ForgetRequest>) -> Response {
    dispatch(&state, Command::Forget { ssid: payload.ssid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockPlatform;
    use crate::cipher::CipherType;
    use crate::context::{ContextOptions, WifiContext};
    use crate::reactor::CurrentConnection;
    use crate::traits::FeatureTier;
    use std::time::Duration;

    fn ranked(ssid: &str, cipher: CipherType, level: u8) -> RankedNetwork {
        RankedNetwork {
            ssid: ssid.into(),
            cipher,
            signal_level: level,
            rssi: -60,
            bssid: "02:00:00:00:00:01".into(),
            capabilities: String::new(),
        }
    }

    #[test]
    fn view_splits_connected_network() {
        let state = ConnectionState {
            wifi_enabled: true,
            current_connection: Some(CurrentConnection {
                ssid: "Home".into(),
            }),
            scan_results: Some(vec![
                ranked("Home", CipherType::WpaFamily, 4),
                ranked("Cafe", CipherType::Open, 2),
            ]),
            ..Default::default()
        };
        let view = StateView::from(&state);
        assert_eq!(view.connected.as_ref().map(|n| n.ssid.as_str()), Some("Home"));
        assert_eq!(view.available.len(), 1);
        assert_eq!(view.available[0].ssid, "Cafe");
        assert_eq!(view.available[0].security, "open");
        assert!(!view.scanning);
    }

    #[test]
    fn view_before_first_scan_is_scanning() {
        let state = ConnectionState {
            wifi_enabled: true,
            current_connection: Some(CurrentConnection {
                ssid: "Home".into(),
            }),
            ..Default::default()
        };
        let view = StateView::from(&state);
        assert!(view.scanning);
        assert_eq!(view.connected_ssid.as_deref(), Some("Home"));
        assert!(view.connected.is_none());
        assert!(view.available.is_empty());
    }

    #[tokio::test]
    async fn handlers_forward_commands_to_the_reactor() {
        let platform = Arc::new(MockPlatform::new(FeatureTier::Profile).with_demo_networks());
        let ctx = WifiContext::start(platform.clone(), ContextOptions::default())
            .await
            .unwrap();
        let app_state = Arc::new(AppState {
            commands: ctx.commands(),
            state: ctx.subscribe(),
        });

        let mut rx = ctx.subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| s.scan_results.is_some()),
        )
        .await
        .unwrap()
        .unwrap();

        let Json(view) = api_state(State(app_state.clone())).await;
        assert!(view.available.iter().any(|n| n.ssid == "CafeGuest"));

        let response = api_connect(
            State(app_state.clone()),
            Json(ConnectRequest {
                ssid: "CafeGuest".into(),
                bssid: None,
                password: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| matches!(s.phase, ConnectPhase::Submitting { .. })),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(platform.submitted().await.len(), 1);

        ctx.shutdown().await.unwrap();
        let response = api_scan(State(app_state)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
