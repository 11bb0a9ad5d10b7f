use crate::traits::ScanRecord;

/// Splits one line of `nmcli -t` output into fields.
/// Terse mode escapes `:` and `\` inside values with a backslash.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Inverse of the usual `(dBm + 100) * 2` percentage mapping.
pub fn percent_to_rssi(percent: u8) -> i32 {
    i32::from(percent.min(100)) / 2 - 100
}

/// Builds a bracketed capability descriptor from nmcli's SECURITY column,
/// e.g. `"WPA1 WPA2"` → `"[WPA1][WPA2][ESS]"`, `""` → `"[ESS]"`.
pub fn security_to_capabilities(security: &str) -> String {
    let mut caps: String = security
        .split_whitespace()
        .filter(|token| *token != "--")
        .map(|token| format!("[{}]", token))
        .collect();
    caps.push_str("[ESS]");
    caps
}

// NM80211ApFlags / NM80211ApSecurityFlags
const AP_FLAG_PRIVACY: u32 = 0x1;
const SEC_KEY_MGMT_PSK: u32 = 0x100;
const SEC_KEY_MGMT_802_1X: u32 = 0x200;
const SEC_KEY_MGMT_SAE: u32 = 0x400;
const SEC_KEY_MGMT_OWE: u32 = 0x800;

/// Synthesizes a capability descriptor from NetworkManager access point flags.
pub fn capabilities_from_nm_flags(flags: u32, wpa_flags: u32, rsn_flags: u32) -> String {
    let mut caps = String::new();
    if wpa_flags == 0 && rsn_flags == 0 && flags & AP_FLAG_PRIVACY != 0 {
        caps.push_str("[WEP]");
    }
    if wpa_flags != 0 {
        let mgmt = if wpa_flags & SEC_KEY_MGMT_802_1X != 0 { "EAP" } else { "PSK" };
        caps.push_str(&format!("[WPA-{}]", mgmt));
    }
    if rsn_flags & SEC_KEY_MGMT_SAE != 0 {
        caps.push_str("[WPA3-SAE]");
    }
    if rsn_flags & SEC_KEY_MGMT_PSK != 0 {
        caps.push_str("[WPA2-PSK]");
    } else if rsn_flags & SEC_KEY_MGMT_802_1X != 0 {
        caps.push_str("[WPA2-EAP]");
    }
    if rsn_flags & SEC_KEY_MGMT_OWE != 0 {
        caps.push_str("[OWE]");
    }
    caps.push_str("[ESS]");
    caps
}

/// Parses `nmcli -t -f SSID,BSSID,SIGNAL,SECURITY device wifi list` output.
/// Hidden networks (empty SSID) are kept; the reducer drops them.
pub fn parse_wifi_list(output: &str) -> Vec<ScanRecord> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields = split_terse(line);
            if fields.len() < 4 {
                return None;
            }
            let signal: u8 = fields[2].trim().parse().unwrap_or(0);
            Some(ScanRecord {
                ssid: fields[0].clone(),
                bssid: fields[1].to_ascii_lowercase(),
                rssi: percent_to_rssi(signal),
                capabilities: security_to_capabilities(&fields[3]),
            })
        })
        .collect()
}
