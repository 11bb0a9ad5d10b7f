use crate::reactor::{Command, ConnectionState, Message, Reactor};
use crate::reducer::SignalScale;
use crate::tier::{ConnectTier, negotiate};
use crate::traits::{EventSink, FeatureTier, WifiPlatform};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Startup options for [`WifiContext`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Forces a tier instead of the one the platform advertises.
    pub tier: Option<FeatureTier>,
    pub signal: SignalScale,
}

/// Cloneable handle for pushing user commands into the reactor.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl CommandSender {
    pub fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(Message::Command(command))
            .map_err(|_| Error::ChannelClosed)
    }
}

/// Owns the platform event registration and the reactor task.
///
/// Created on start, torn down with [`WifiContext::shutdown`]. The platform
/// accepts one registration at a time, so two live contexts over the same
/// platform cannot exist: the second `start` fails with
/// [`Error::AlreadyRegistered`].
pub struct WifiContext {
    platform: Arc<dyn WifiPlatform>,
    tier: FeatureTier,
    tx: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<ConnectionState>,
    reactor: Option<JoinHandle<()>>,
}

impl WifiContext {
    pub async fn start(platform: Arc<dyn WifiPlatform>, options: ContextOptions) -> Result<Self> {
        let kind = options.tier.unwrap_or_else(|| platform.feature_tier());
        let tier: Arc<dyn ConnectTier> = Arc::from(negotiate(kind));
        info!("🚀 Starting Wi-Fi context with {:?} tier", kind);

        let (tx, rx) = mpsc::unbounded_channel();
        platform.register(EventSink::new(tx.clone())).await?;

        let (publisher, state) = watch::channel(ConnectionState::default());
        let reactor = Reactor::new(platform.clone(), tier, options.signal, rx, publisher);
        let handle = tokio::spawn(reactor.run());

        Ok(Self {
            platform,
            tier: kind,
            tx,
            state,
            reactor: Some(handle),
        })
    }

    pub fn tier(&self) -> FeatureTier {
        self.tier
    }

    pub fn commands(&self) -> CommandSender {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Latest published state.
    pub fn snapshot(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Drops the event registration, drains queued messages, and stops the reactor.
    pub async fn shutdown(mut self) -> Result<()> {
        self.platform.unregister().await?;
        let _ = self.tx.send(Message::Shutdown);
        if let Some(handle) = self.reactor.take() {
            handle
                .await
                .map_err(|e| Error::CommandFailed(format!("Reactor task failed: {}", e)))?;
        }
        info!("👋 Wi-Fi context stopped");
        Ok(())
    }
}

/// Dropping without [`WifiContext::shutdown`] still releases the registration
/// when a runtime is around to run the unregister call.
impl Drop for WifiContext {
    fn drop(&mut self) {
        if self.reactor.take().is_none() {
            return;
        }
        let _ = self.tx.send(Message::Shutdown);
        let platform = self.platform.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = platform.unregister().await {
                        warn!("⚠️ Failed to unregister dropped Wi-Fi context: {}", e);
                    }
                });
            }
            Err(_) => warn!("⚠️ Wi-Fi context dropped outside a runtime, registration left in place"),
        }
    }
}
