//! Decide from an advertisement which driver, if any, speaks to a device.
//!
//! Matching is static: it only reads advertisement data and never connects.
//! Kinds are tried in declaration order and the first match wins, so when two
//! vendors would both claim a device the one declared first gets it.

use bluest::Uuid;

use crate::driver::DriverConfig;
use tokio::time::Duration;

/// What discovery reports about one nearby device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub name: Option<String>,
    pub address: String,
    pub service_uuids: Vec<Uuid>,
    pub connectable: bool,
    pub rssi: Option<i16>,
}

/// One static rule a vendor uses to recognize its devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matcher {
    /// Glob over the local name, `*` and `?` wildcards
    pub local_name: &'static str,
    pub service_uuid: Option<Uuid>,
    pub connectable: bool,
}

impl Matcher {
    pub const fn local_name(pattern: &'static str) -> Self {
        Self {
            local_name: pattern,
            service_uuid: None,
            connectable: true,
        }
    }

    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        if self.connectable && !advertisement.connectable {
            return false;
        }
        if let Some(uuid) = self.service_uuid {
            if !advertisement.service_uuids.contains(&uuid) {
                return false;
            }
        }
        advertisement
            .name
            .as_deref()
            .is_some_and(|name| glob_match(self.local_name, name))
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` and the text index it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(&'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, tried)) => {
                    p = star + 1;
                    t = tried + 1;
                    backtrack = Some((star, tried + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: &'static str,
    pub model: &'static str,
}

/// The supported vendors, in matching order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BmsKind {
    Supervolt,
    Offgridtec,
}

impl BmsKind {
    pub const ALL: [BmsKind; 2] = [BmsKind::Supervolt, BmsKind::Offgridtec];

    pub fn matchers(self) -> &'static [Matcher] {
        const SUPERVOLT: [Matcher; 1] = [Matcher::local_name("libatt*")];
        const OFFGRIDTEC: [Matcher; 2] = [
            Matcher::local_name("SmartBat-A*"),
            Matcher::local_name("SmartBat-B*"),
        ];
        match self {
            BmsKind::Supervolt => &SUPERVOLT,
            BmsKind::Offgridtec => &OFFGRIDTEC,
        }
    }

    pub fn device_info(self) -> DeviceInfo {
        match self {
            BmsKind::Supervolt => DeviceInfo {
                manufacturer: "Supervolt",
                model: "Black",
            },
            BmsKind::Offgridtec => DeviceInfo {
                manufacturer: "Offgridtec",
                model: "LiFePo4 Smart Pro",
            },
        }
    }

    /// Whether any of this vendor's matchers accepts the advertisement.
    pub fn supported(self, advertisement: &Advertisement) -> bool {
        self.matchers().iter().any(|m| m.matches(advertisement))
    }

    pub fn default_config(self) -> DriverConfig {
        match self {
            BmsKind::Supervolt => DriverConfig::default(),
            BmsKind::Offgridtec => DriverConfig {
                response_timeout: Duration::from_secs(1),
                ..DriverConfig::default()
            },
        }
    }
}

impl std::fmt::Display for BmsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.device_info();
        write!(f, "{} {}", info.manufacturer, info.model)
    }
}

/// Ordered list of kinds and the matchers that claim devices for them.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<(BmsKind, Vec<Matcher>)>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(BmsKind::ALL.iter().map(|&kind| (kind, kind.matchers().to_vec())))
    }
}

impl Registry {
    pub fn new(entries: impl IntoIterator<Item = (BmsKind, Vec<Matcher>)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// The first kind, in declaration order, that claims the device.
    pub fn identify(&self, advertisement: &Advertisement) -> Option<BmsKind> {
        self.entries
            .iter()
            .find(|(_, matchers)| matchers.iter().any(|m| m.matches(advertisement)))
            .map(|(kind, _)| *kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertised(name: &str) -> Advertisement {
        Advertisement {
            name: Some(name.to_string()),
            address: "cc:cc:cc:cc:cc:cc".to_string(),
            connectable: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_glob() {
        assert!(glob_match("libatt*", "libatt"));
        assert!(glob_match("libatt*", "libatt12v100"));
        assert!(glob_match("SP0*", "SP01B"));
        assert!(glob_match("a?c*d", "abcxxd"));
        assert!(glob_match("*x*", "abxcd"));
        assert!(!glob_match("libatt*", "xlibatt"));
        assert!(!glob_match("a?c", "ac"));
        assert!(!glob_match("abc", "abcd"));
    }

    #[test]
    fn test_identify() {
        let registry = Registry::default();
        assert_eq!(registry.identify(&advertised("libatt12v100")), Some(BmsKind::Supervolt));
        assert_eq!(registry.identify(&advertised("SmartBat-A12345")), Some(BmsKind::Offgridtec));
        assert_eq!(registry.identify(&advertised("SmartBat-B12294")), Some(BmsKind::Offgridtec));
        assert_eq!(registry.identify(&advertised("SmartBat-C12294")), None);
        assert_eq!(registry.identify(&advertised("BT_HC6172")), None);
    }

    #[test]
    fn test_requires_connectable_and_name() {
        let registry = Registry::default();
        let mut advertisement = advertised("libatt12v100");
        advertisement.connectable = false;
        assert_eq!(registry.identify(&advertisement), None);
        advertisement.connectable = true;
        advertisement.name = None;
        assert_eq!(registry.identify(&advertisement), None);
    }

    #[test]
    fn test_service_uuid_matcher() {
        let service = crate::transport::short_uuid(0xfff0);
        let matcher = Matcher {
            service_uuid: Some(service),
            ..Matcher::local_name("SP0*")
        };
        let mut advertisement = advertised("SP01B");
        assert!(!matcher.matches(&advertisement));
        advertisement.service_uuids.push(service);
        assert!(matcher.matches(&advertisement));
    }

    #[test]
    fn test_first_declared_wins() {
        let everything = vec![Matcher::local_name("*")];
        let registry = Registry::new([
            (BmsKind::Offgridtec, everything.clone()),
            (BmsKind::Supervolt, everything.clone()),
        ]);
        for _ in 0..10 {
            assert_eq!(registry.identify(&advertised("libatt12v100")), Some(BmsKind::Offgridtec));
        }

        let registry = Registry::new([
            (BmsKind::Supervolt, everything.clone()),
            (BmsKind::Offgridtec, everything),
        ]);
        assert_eq!(registry.identify(&advertised("SmartBat-A12345")), Some(BmsKind::Supervolt));
    }

    #[test]
    fn test_device_info() {
        for kind in BmsKind::ALL {
            let info = kind.device_info();
            assert!(!info.manufacturer.is_empty());
            assert!(!info.model.is_empty());
            assert!(!kind.matchers().is_empty());
        }
        assert_eq!(BmsKind::Supervolt.to_string(), "Supervolt Black");
    }

    #[test]
    fn test_supported() {
        assert!(BmsKind::Supervolt.supported(&advertised("libatt12v100")));
        assert!(!BmsKind::Supervolt.supported(&advertised("SmartBat-B12294")));
        assert!(BmsKind::Offgridtec.supported(&advertised("SmartBat-B12294")));
    }
}
