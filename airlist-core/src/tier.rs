//! Feature tiers.
//!
//! Platforms differ in how a connection is requested and whether the radio
//! may be switched directly. The tier is picked once when the context starts
//! and the rest of the crate only talks to [`ConnectTier`].

use crate::cipher::{CipherType, is_wpa3};
use crate::traits::{
    ConnectionRequest, FeatureTier, KeyManagement, NetworkProfile, Passphrase, RankedNetwork,
    Suggestion,
};

/// What a radio toggle turns into on a given tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioToggle {
    Direct(bool),
    OpenSettings,
}

pub trait ConnectTier: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> FeatureTier;

    /// Builds the single request for `network`, carrying `credential` if given.
    fn build_request(&self, network: &RankedNetwork, credential: Option<&str>) -> ConnectionRequest;

    fn radio_toggle(&self, enabled: bool) -> RadioToggle;

    /// Whether a duplicate submission still needs a follow-up activation.
    fn activates_after_submit(&self) -> bool;
}

/// Explicit profiles; the radio is switched directly.
#[derive(Debug, Default)]
pub struct ProfileTier;

impl ConnectTier for ProfileTier {
    fn kind(&self) -> FeatureTier {
        FeatureTier::Profile
    }

    fn build_request(&self, network: &RankedNetwork, credential: Option<&str>) -> ConnectionRequest {
        let (key_mgmt, secret) = match network.cipher {
            CipherType::Wep => (KeyManagement::Wep, credential.map(str::to_owned)),
            CipherType::WpaFamily => (KeyManagement::WpaPsk, credential.map(str::to_owned)),
            CipherType::Open | CipherType::Invalid => (KeyManagement::None, None),
        };
        ConnectionRequest::Profile(NetworkProfile {
            ssid: network.ssid.clone(),
            key_mgmt,
            secret,
        })
    }

    fn radio_toggle(&self, enabled: bool) -> RadioToggle {
        RadioToggle::Direct(enabled)
    }

    fn activates_after_submit(&self) -> bool {
        false
    }
}

/// Suggestions pinned to a BSSID; radio changes go through the settings surface.
#[derive(Debug, Default)]
pub struct SuggestionTier;

impl ConnectTier for SuggestionTier {
    fn kind(&self) -> FeatureTier {
        FeatureTier::Suggestion
    }

    fn build_request(&self, network: &RankedNetwork, credential: Option<&str>) -> ConnectionRequest {
        let passphrase = match network.cipher {
            CipherType::Wep | CipherType::WpaFamily => credential.map(|secret| {
                if is_wpa3(&network.capabilities) {
                    Passphrase::Wpa3(secret.to_owned())
                } else {
                    Passphrase::Wpa2(secret.to_owned())
                }
            }),
            CipherType::Open | CipherType::Invalid => None,
        };
        ConnectionRequest::Suggestion(Suggestion {
            ssid: network.ssid.clone(),
            bssid: network.bssid.clone(),
            passphrase,
            app_interaction_required: true,
        })
    }

    fn radio_toggle(&self, _enabled: bool) -> RadioToggle {
        RadioToggle::OpenSettings
    }

    fn activates_after_submit(&self) -> bool {
        true
    }
}

/// Picks the tier implementation for `tier`.
pub fn negotiate(tier: FeatureTier) -> Box<dyn ConnectTier> {
    match tier {
        FeatureTier::Profile => Box::new(ProfileTier),
        FeatureTier::Suggestion => Box::new(SuggestionTier),
    }
}
