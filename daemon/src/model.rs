//! Core value types: network identity, hardware addresses, bands and samples

use crate::error::{AddressParseError, MonitorError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;

pub fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Weakest and strongest RSSI accepted from a scan, in dBm.
pub const RSSI_FLOOR_DBM: i32 = -120;
pub const RSSI_CEILING_DBM: i32 = 0;

// ---------------------------------------------------------------------------
// Hardware addresses
// ---------------------------------------------------------------------------

/// A 6-byte IEEE 802 hardware address (the BSSID of an access point).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Parse `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff` or `aabbccddeeff`.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        let bytes = parse_hex_octets(s, 6).ok_or_else(|| AddressParseError {
            input: s.to_owned(),
            expected: "six hex octets such as aa:bb:cc:dd:ee:ff",
        })?;
        let mut arr = [0u8; 6];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn oui(&self) -> OuiPrefix {
        OuiPrefix([self.0[0], self.0[1], self.0[2]])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({self})")
    }
}

impl TryFrom<String> for MacAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MacAddress> for String {
    fn from(value: MacAddress) -> Self {
        value.to_string()
    }
}

/// Organizationally Unique Identifier: the first three octets of an address.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OuiPrefix(pub [u8; 3]);

impl OuiPrefix {
    /// Parse a bare prefix (`00:1a:2b`, `00-1A-2B`, `001a2b`) or a full
    /// address, in which case only the first three octets are kept.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        if let Ok(mac) = MacAddress::parse(s) {
            return Ok(mac.oui());
        }
        let bytes = parse_hex_octets(s, 3).ok_or_else(|| AddressParseError {
            input: s.to_owned(),
            expected: "three hex octets such as 00:1a:2b",
        })?;
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    /// Compact key used by the static vendor table, e.g. `0x001A2B`.
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes([0, self.0[0], self.0[1], self.0[2]])
    }
}

impl fmt::Display for OuiPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}")
    }
}

impl fmt::Debug for OuiPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OuiPrefix({self})")
    }
}

impl TryFrom<String> for OuiPrefix {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OuiPrefix> for String {
    fn from(value: OuiPrefix) -> Self {
        value.to_string()
    }
}

fn parse_hex_octets(s: &str, count: usize) -> Option<Vec<u8>> {
    let s = s.trim();
    let parts: Vec<&str> = if s.contains(':') {
        s.split(':').collect()
    } else if s.contains('-') {
        s.split('-').collect()
    } else {
        if s.len() != count * 2 || !s.is_ascii() {
            return None;
        }
        (0..count).map(|i| &s[i * 2..i * 2 + 2]).collect()
    };
    if parts.len() != count {
        return None;
    }
    parts
        .iter()
        .map(|p| {
            if p.len() == 2 {
                u8::from_str_radix(p, 16).ok()
            } else {
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Network identity
// ---------------------------------------------------------------------------

/// A network as seen from one access point: SSID plus BSSID.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NetworkId {
    pub ssid: String,
    pub bssid: MacAddress,
}

impl NetworkId {
    pub fn new(ssid: impl Into<String>, bssid: MacAddress) -> Self {
        Self { ssid: ssid.into(), bssid }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ssid.is_empty() {
            write!(f, "<hidden> ({})", self.bssid)
        } else {
            write!(f, "{} ({})", self.ssid, self.bssid)
        }
    }
}

// ---------------------------------------------------------------------------
// Bands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "2.4GHz")]
    Band2_4GHz,
    #[serde(rename = "5GHz")]
    Band5GHz,
    #[serde(rename = "6GHz")]
    Band6GHz,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Band2_4GHz, Band::Band5GHz, Band::Band6GHz];

    /// Channels a network may be placed on in this band.
    pub fn channel_plan(&self) -> Vec<u8> {
        match self {
            Band::Band2_4GHz => (1..=13).collect(),
            Band::Band5GHz => (36..=64)
                .step_by(4)
                .chain((100..=144).step_by(4))
                .chain((149..=165).step_by(4))
                .collect(),
            Band::Band6GHz => (1..=233).step_by(4).collect(),
        }
    }

    /// Whether `channel` is a valid channel number for this band at all
    /// (wider than the recommendation plan: 2.4 GHz channel 14 is accepted).
    pub fn accepts(&self, channel: u8) -> bool {
        match self {
            Band::Band2_4GHz => (1..=14).contains(&channel),
            Band::Band5GHz => (32..=177).contains(&channel),
            Band::Band6GHz => (1..=233).contains(&channel),
        }
    }

    /// 5 GHz channels that require radar detection before use.
    pub fn is_dfs(&self, channel: u8) -> bool {
        matches!(self, Band::Band5GHz) && (52..=144).contains(&channel)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Band::Band2_4GHz => write!(f, "2.4 GHz"),
            Band::Band5GHz => write!(f, "5 GHz"),
            Band::Band6GHz => write!(f, "6 GHz"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sample
// ---------------------------------------------------------------------------

/// One signal reading of one network. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    network: NetworkId,
    timestamp_ms: TimestampMs,
    rssi_dbm: i32,
    channel: u8,
    band: Band,
    bandwidth_mhz: u16,
}

impl Sample {
    /// Validate and build a sample. Readings outside the physically
    /// plausible range are rejected.
    pub fn new(
        network: NetworkId,
        timestamp_ms: TimestampMs,
        rssi_dbm: i32,
        channel: u8,
        band: Band,
        bandwidth_mhz: u16,
    ) -> Result<Self, MonitorError> {
        let invalid = |reason: String| MonitorError::InvalidSample {
            network: network.to_string(),
            reason,
        };
        if !(RSSI_FLOOR_DBM..=RSSI_CEILING_DBM).contains(&rssi_dbm) {
            return Err(invalid(format!(
                "rssi {rssi_dbm} dBm outside [{RSSI_FLOOR_DBM}, {RSSI_CEILING_DBM}]"
            )));
        }
        if !band.accepts(channel) {
            return Err(invalid(format!("channel {channel} is not a {band} channel")));
        }
        if !matches!(bandwidth_mhz, 20 | 40 | 80 | 160 | 320) {
            return Err(invalid(format!("unsupported bandwidth {bandwidth_mhz} MHz")));
        }
        Ok(Self {
            network,
            timestamp_ms,
            rssi_dbm,
            channel,
            band,
            bandwidth_mhz,
        })
    }

    pub fn network(&self) -> &NetworkId {
        &self.network
    }

    pub fn timestamp_ms(&self) -> TimestampMs {
        self.timestamp_ms
    }

    pub fn rssi_dbm(&self) -> i32 {
        self.rssi_dbm
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn band(&self) -> Band {
        self.band
    }

    pub fn bandwidth_mhz(&self) -> u16 {
        self.bandwidth_mhz
    }
}
