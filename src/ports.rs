use crate::error::PortSpecError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Named port lists the backend resolves on its side.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PortPreset {
    Common,
    Top100,
    Top1000,
}

impl PortPreset {
    pub const ALL: [PortPreset; 3] = [PortPreset::Common, PortPreset::Top100, PortPreset::Top1000];

    pub fn as_str(self) -> &'static str {
        match self {
            PortPreset::Common => "common",
            PortPreset::Top100 => "top100",
            PortPreset::Top1000 => "top1000",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

/// Port selection of a scan request: a preset name or a custom list.
///
/// Both forms go over the wire as a plain string, e.g. `"top100"` or
/// `"80,90-95,443"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    Preset(PortPreset),
    Custom(String),
}

impl PortSpec {
    pub fn as_str(&self) -> &str {
        match self {
            PortSpec::Preset(p) => p.as_str(),
            PortSpec::Custom(s) => s,
        }
    }

    /// Build a validated custom spec. The text is trimmed; it must be
    /// non-empty and follow the comma/range grammar.
    pub fn custom(raw: &str) -> Result<Self, PortSpecError> {
        let raw = raw.trim();
        parse_port_spec(raw)?;
        Ok(PortSpec::Custom(raw.to_string()))
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PortSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PortSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match PortPreset::from_name(&s) {
            Some(p) => PortSpec::Preset(p),
            None => PortSpec::Custom(s),
        })
    }
}

/// Parse a custom port list into a deduplicated list of ports (1..=65535).
///
/// Supported entries, separated by commas:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// Whitespace around entries is ignored. An empty entry (`80,,443`) is an error.
pub fn parse_port_spec(s: &str) -> Result<Vec<u16>, PortSpecError> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_entry) in s.split(',').enumerate() {
        let entry = raw_entry.trim();
        if entry.is_empty() {
            return Err(PortSpecError::EmptyEntry(idx + 1));
        }

        if let Some((a, b)) = entry.split_once('-') {
            let start = parse_port_str(a.trim())?;
            let end = parse_port_str(b.trim())?;
            if start > end {
                return Err(PortSpecError::ReversedRange { start, end });
            }
            for p in start..=end {
                if seen.insert(p) {
                    out.push(p);
                }
            }
            continue;
        }

        let p = parse_port_str(entry)?;
        if seen.insert(p) {
            out.push(p);
        }
    }

    Ok(out)
}

fn parse_port_str(s: &str) -> Result<u16, PortSpecError> {
    // digits only: `u32::from_str` would also take a leading `+`
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PortSpecError::InvalidPort(s.to_string()));
    }
    let val: u32 = s
        .parse::<u32>()
        .map_err(|_| PortSpecError::InvalidPort(s.to_string()))?;
    if val == 0 || val > 65535 {
        return Err(PortSpecError::OutOfRange(val));
    }
    Ok(val as u16)
}
