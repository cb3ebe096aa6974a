//! Turning quick-scan and advanced-form input into a canonical `ScanRequest`.
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::ValidationError;
use crate::ports::{PortPreset, PortSpec};
use crate::types::{Protocol, ScanRequest};

pub const QUICK_TIMEOUT_SECS: u32 = 3;
pub const QUICK_THREADS: u32 = 50;

/// Placeholder shown in the custom ports field.
pub const CUSTOM_PORTS_HINT: &str = "80,443,8080 or 1-1000 or 80,90-95,443";

/// Quick scan: common ports, TCP only, 3 s timeout, 50 threads.
pub fn build_quick_request(target: &str) -> Result<ScanRequest, ValidationError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ValidationError::MissingTarget);
    }
    Ok(ScanRequest {
        target: target.to_string(),
        ports: PortSpec::Preset(PortPreset::Common),
        protocols: BTreeSet::from([Protocol::Tcp]),
        timeout_secs: QUICK_TIMEOUT_SECS,
        threads: QUICK_THREADS,
    })
}

/// What a target string looks like. Informational only: any non-empty
/// target is sent as typed and the backend decides whether it resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Address(IpAddr),
    Network(IpNet),
    Hostname,
}

impl TargetKind {
    pub fn classify(target: &str) -> Self {
        let target = target.trim();
        if let Ok(ip) = target.parse::<IpAddr>() {
            return TargetKind::Address(ip);
        }
        if let Ok(net) = target.parse::<IpNet>() {
            return TargetKind::Network(net);
        }
        TargetKind::Hostname
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Address(IpAddr::V4(_)) => f.write_str("IPv4 address"),
            TargetKind::Address(IpAddr::V6(_)) => f.write_str("IPv6 address"),
            TargetKind::Network(net) => write!(f, "network ({} hosts max)", host_capacity(net)),
            TargetKind::Hostname => f.write_str("hostname"),
        }
    }
}

fn host_capacity(net: &IpNet) -> u128 {
    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
}

/// Port option radio group of the advanced form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOption {
    Preset(PortPreset),
    Custom,
}

impl PortOption {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "custom" => Some(PortOption::Custom),
            other => PortPreset::from_name(other).map(PortOption::Preset),
        }
    }
}

/// State of the ports text field, driven by the port option selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortField {
    option: PortOption,
    value: String,
    pub required: bool,
    pub visible: bool,
    pub placeholder: &'static str,
}

impl Default for PortField {
    fn default() -> Self {
        Self {
            option: PortOption::Preset(PortPreset::Common),
            value: PortPreset::Common.as_str().to_string(),
            required: false,
            visible: false,
            placeholder: "",
        }
    }
}

impl PortField {
    pub fn option(&self) -> PortOption {
        self.option
    }

    /// Switch the selector. Custom clears any previous value and makes the
    /// field required; a preset hides the field and fills in its name.
    pub fn select(&mut self, option: PortOption) {
        self.option = option;
        match option {
            PortOption::Custom => {
                self.visible = true;
                self.required = true;
                self.value.clear();
                self.placeholder = CUSTOM_PORTS_HINT;
            }
            PortOption::Preset(p) => {
                self.visible = false;
                self.required = false;
                self.value = p.as_str().to_string();
            }
        }
    }

    /// Text typed by the user. Ignored unless the custom option is selected.
    pub fn set_custom(&mut self, text: impl Into<String>) {
        if self.option == PortOption::Custom {
            self.value = text.into();
        }
    }

    /// Whatever the field currently holds, custom text or preset name.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Raw advanced-form state. Numeric fields stay text until the request is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvancedForm {
    pub target: String,
    pub ports: PortField,
    pub tcp: bool,
    pub udp: bool,
    pub timeout: String,
    pub threads: String,
}

impl Default for AdvancedForm {
    fn default() -> Self {
        Self {
            target: String::new(),
            ports: PortField::default(),
            tcp: true,
            udp: false,
            timeout: QUICK_TIMEOUT_SECS.to_string(),
            threads: QUICK_THREADS.to_string(),
        }
    }
}

impl AdvancedForm {
    pub fn select_port_option(&mut self, option: PortOption) {
        self.ports.select(option);
    }
}

pub fn build_advanced_request(form: &AdvancedForm) -> Result<ScanRequest, ValidationError> {
    let target = form.target.trim();
    if target.is_empty() {
        return Err(ValidationError::MissingTarget);
    }

    let ports = match form.ports.option() {
        PortOption::Custom => {
            let raw = form.ports.value().trim();
            if raw.is_empty() {
                return Err(ValidationError::MissingPortSpec);
            }
            PortSpec::custom(raw)?
        }
        PortOption::Preset(p) => PortSpec::Preset(p),
    };

    let mut protocols = BTreeSet::new();
    if form.tcp {
        protocols.insert(Protocol::Tcp);
    }
    if form.udp {
        protocols.insert(Protocol::Udp);
    }
    if protocols.is_empty() {
        return Err(ValidationError::NoProtocolSelected);
    }

    Ok(ScanRequest {
        target: target.to_string(),
        ports,
        protocols,
        timeout_secs: parse_positive("timeout", &form.timeout)?,
        threads: parse_positive("threads", &form.threads)?,
    })
}

fn parse_positive(field: &'static str, raw: &str) -> Result<u32, ValidationError> {
    match raw.trim().parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ValidationError::InvalidNumericField {
            field,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortSpecError;

    fn form(target: &str) -> AdvancedForm {
        AdvancedForm {
            target: target.into(),
            ..AdvancedForm::default()
        }
    }

    #[test]
    fn quick_request_is_fixed_preset() {
        for target in ["192.168.1.1", "  example.org ", "10.0.0.0/24"] {
            let req = build_quick_request(target).unwrap();
            assert_eq!(req.target, target.trim());
            assert_eq!(req.ports.as_str(), "common");
            assert_eq!(req.protocols, BTreeSet::from([Protocol::Tcp]));
            assert_eq!((req.timeout_secs, req.threads), (3, 50));
        }
    }

    #[test]
    fn quick_request_needs_target() {
        assert_eq!(build_quick_request("   "), Err(ValidationError::MissingTarget));
    }

    #[test]
    fn custom_without_ports_fails() {
        let mut f = form("host");
        f.select_port_option(PortOption::Custom);
        assert_eq!(build_advanced_request(&f), Err(ValidationError::MissingPortSpec));
        f.ports.set_custom("   ");
        assert_eq!(build_advanced_request(&f), Err(ValidationError::MissingPortSpec));
    }

    #[test]
    fn custom_grammar_is_checked() {
        let mut f = form("host");
        f.select_port_option(PortOption::Custom);
        f.ports.set_custom("80,abc");
        assert_eq!(
            build_advanced_request(&f),
            Err(ValidationError::InvalidPortSpec(PortSpecError::InvalidPort("abc".into())))
        );
        f.ports.set_custom(" 80,90-95,443 ");
        let req = build_advanced_request(&f).unwrap();
        assert_eq!(req.ports, PortSpec::Custom("80,90-95,443".into()));
    }

    #[test]
    fn no_protocol_fails() {
        let mut f = form("host");
        f.tcp = false;
        f.udp = false;
        assert_eq!(build_advanced_request(&f), Err(ValidationError::NoProtocolSelected));
    }

    #[test]
    fn numeric_fields_must_parse() {
        let mut f = form("host");
        f.timeout = "soon".into();
        assert!(matches!(
            build_advanced_request(&f),
            Err(ValidationError::InvalidNumericField { field: "timeout", .. })
        ));
        f.timeout = "5".into();
        f.threads = "0".into();
        assert!(matches!(
            build_advanced_request(&f),
            Err(ValidationError::InvalidNumericField { field: "threads", .. })
        ));
        f.threads = " 200 ".into();
        let req = build_advanced_request(&f).unwrap();
        assert_eq!((req.timeout_secs, req.threads), (5, 200));
    }

    #[test]
    fn toggling_custom_then_preset_resets_field() {
        let mut f = form("host");
        f.select_port_option(PortOption::Custom);
        assert!(f.ports.required && f.ports.visible);
        f.ports.set_custom("22,80");
        f.select_port_option(PortOption::Custom);
        assert_eq!(f.ports.value(), "");
        f.ports.set_custom("22,80");
        f.select_port_option(PortOption::Preset(PortPreset::Top100));
        assert!(!f.ports.required && !f.ports.visible);
        assert_eq!(f.ports.value(), "top100");
        assert_eq!(build_advanced_request(&f).unwrap().ports.as_str(), "top100");

        // the custom text does not survive a round trip through a preset
        f.select_port_option(PortOption::Custom);
        assert_eq!(f.ports.value(), "");
    }

    #[test]
    fn both_protocols_selected() {
        let mut f = form("host");
        f.udp = true;
        let req = build_advanced_request(&f).unwrap();
        assert_eq!(req.protocols, BTreeSet::from([Protocol::Tcp, Protocol::Udp]));
    }

    #[test]
    fn classifies_targets() {
        assert!(matches!(
            TargetKind::classify("192.168.1.1"),
            TargetKind::Address(IpAddr::V4(_))
        ));
        assert!(matches!(TargetKind::classify("::1"), TargetKind::Address(IpAddr::V6(_))));
        assert!(matches!(
            TargetKind::classify(" 10.0.0.0/24 "),
            TargetKind::Network(_)
        ));
        assert_eq!(TargetKind::classify("scanme.example.org"), TargetKind::Hostname);
        assert_eq!(
            TargetKind::classify("10.0.0.0/24").to_string(),
            "network (256 hosts max)"
        );
    }

    #[test]
    fn port_option_names() {
        assert_eq!(PortOption::parse("custom"), Some(PortOption::Custom));
        assert_eq!(
            PortOption::parse("top1000"),
            Some(PortOption::Preset(PortPreset::Top1000))
        );
        assert_eq!(PortOption::parse("all"), None);
    }
}
