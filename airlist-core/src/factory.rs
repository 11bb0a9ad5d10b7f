use crate::config::{AppConfig, BackendKind};
use crate::traits::{FeatureTier, WifiPlatform};
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// Builds the platform backend selected in the configuration.
pub async fn create_platform(config: &AppConfig) -> Result<Arc<dyn WifiPlatform>> {
    match config.backend {
        BackendKind::Mock => {
            info!("🤖 Backend: mock platform selected (for local development)");
            let tier = config.tier.unwrap_or(FeatureTier::Suggestion);
            Ok(Arc::new(
                crate::backends::mock::MockPlatform::new(tier)
                    .with_demo_networks()
                    .with_auto_validate(),
            ))
        }
        BackendKind::Nmcli => {
            info!("📦 Backend: nmcli on {}", config.interface);
            Ok(Arc::new(crate::backends::nmcli::NmcliPlatform::new(
                config.interface.clone(),
            )))
        }
        #[cfg(feature = "backend_nmdbus")]
        BackendKind::Nmdbus => {
            info!("🔌 Backend: NetworkManager D-Bus on {}", config.interface);
            Ok(Arc::new(
                crate::backends::nmdbus::NmDbusPlatform::new(config.interface.clone()).await?,
            ))
        }
        #[cfg(not(feature = "backend_nmdbus"))]
        BackendKind::Nmdbus => Err(crate::Error::Config(
            "backend 'nmdbus' needs the `backend_nmdbus` feature".into(),
        )),
    }
}
