use serde::{Deserialize, Serialize};

/// Encryption class of an access point, derived from its capability descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherType {
    Open,
    Wep,
    WpaFamily,
    /// The descriptor was empty and could not be classified.
    Invalid,
}

impl CipherType {
    /// Whether connecting needs a secret from the user.
    pub fn requires_credential(self) -> bool {
        matches!(self, CipherType::Wep | CipherType::WpaFamily)
    }

    /// Short label for list rows.
    pub fn label(self) -> &'static str {
        match self {
            CipherType::Wep | CipherType::WpaFamily => "encrypted",
            CipherType::Open => "open",
            CipherType::Invalid => "",
        }
    }
}

/// Classifies a raw capability descriptor.
///
/// Matching is case-sensitive: platform descriptors use uppercase tokens.
pub fn classify(capabilities: &str) -> CipherType {
    if capabilities.is_empty() {
        CipherType::Invalid
    } else if capabilities.contains("WEP") {
        CipherType::Wep
    } else if ["WPA", "WPA2", "WPS"]
        .iter()
        .any(|token| capabilities.contains(token))
    {
        CipherType::WpaFamily
    } else {
        CipherType::Open
    }
}

/// True when the descriptor advertises WPA3 (explicit marker or SAE key management).
pub fn is_wpa3(capabilities: &str) -> bool {
    let lower = capabilities.to_ascii_lowercase();
    lower.contains("wpa3") || lower.contains("sae")
}
