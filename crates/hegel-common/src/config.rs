//! Configuration values for Hegel
//!
//! Every value here is parsed once at startup from the process
//! environment (via the server's command line) and is immutable afterwards.

use crate::error::{Error, Result};
use ipnet::IpNet;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Default custom endpoint table: `/metadata` serves the whole metadata object
pub const DEFAULT_CUSTOM_ENDPOINTS: &str = r#"{"/metadata":".metadata"}"#;

/// Response shaping strategy for custom endpoints
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DataModel {
    /// Export the whole record through the fixed export projection
    #[default]
    Legacy,
    /// Apply the endpoint's query expression to the record
    Filtered,
}

impl FromStr for DataModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Ok(Self::Legacy),
            "1" => Ok(Self::Filtered),
            other => Err(Error::configuration(format!(
                "unknown DATA_MODEL_VERSION {other:?}"
            ))),
        }
    }
}

impl fmt::Display for DataModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Filtered => f.write_str("filtered"),
        }
    }
}

/// Mapping from HTTP path to query expression text
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomEndpoints(BTreeMap<String, String>);

impl CustomEndpoints {
    /// Parse the endpoint table from its JSON object form
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the text is not a JSON object of
    /// strings, or if a path does not start with `/`.
    pub fn from_json(text: &str) -> Result<Self> {
        let endpoints: BTreeMap<String, String> = serde_json::from_str(text)
            .map_err(|e| Error::configuration(format!("error in parsing custom endpoints: {e}")))?;

        for path in endpoints.keys() {
            if !path.starts_with('/') {
                return Err(Error::configuration(format!(
                    "custom endpoint path {path:?} must start with '/'"
                )));
            }
        }

        Ok(Self(endpoints))
    }

    /// Iterate over `(path, filter)` pairs in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(p, f)| (p.as_str(), f.as_str()))
    }

    /// Number of configured endpoints
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no endpoints are configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for CustomEndpoints {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json(s)
    }
}

/// Networks whose `X-Forwarded-For` headers are believed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrustedProxies(Vec<IpNet>);

impl TrustedProxies {
    /// Parse a comma-separated list of CIDRs or bare addresses
    ///
    /// # Errors
    /// Returns `Error::Configuration` on the first entry that is neither.
    pub fn parse(list: &str) -> Result<Self> {
        let mut nets = Vec::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let net = entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                .map_err(|_| {
                    Error::configuration(format!("invalid trusted proxy {entry:?}"))
                })?;
            nets.push(net);
        }
        Ok(Self(nets))
    }

    /// True if `ip` lies inside any trusted network
    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.iter().any(|net| net.contains(ip))
    }

    /// True if no proxies are trusted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for TrustedProxies {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_model_switch() {
        assert_eq!("".parse::<DataModel>().unwrap(), DataModel::Legacy);
        assert_eq!("1".parse::<DataModel>().unwrap(), DataModel::Filtered);
        let err = "2".parse::<DataModel>().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_default_custom_endpoints() {
        let endpoints = CustomEndpoints::from_json(DEFAULT_CUSTOM_ENDPOINTS).unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(
            endpoints.iter().next(),
            Some(("/metadata", ".metadata"))
        );
    }

    #[test]
    fn test_custom_endpoints_rejects_garbage() {
        assert!(CustomEndpoints::from_json("not json").is_err());
        assert!(CustomEndpoints::from_json(r#"{"/a": 1}"#).is_err());
        assert!(CustomEndpoints::from_json(r#"{"relative": ".x"}"#).is_err());
    }

    #[test]
    fn test_trusted_proxies() {
        let proxies = TrustedProxies::parse("10.0.0.0/8, 192.168.1.7,fd00::/8").unwrap();
        assert!(proxies.contains(&"10.1.2.3".parse().unwrap()));
        assert!(proxies.contains(&"192.168.1.7".parse().unwrap()));
        assert!(proxies.contains(&"fd00::1".parse().unwrap()));
        assert!(!proxies.contains(&"192.168.1.8".parse().unwrap()));

        assert!(TrustedProxies::parse("").unwrap().is_empty());
        assert!(TrustedProxies::parse("10.0.0.0/33").is_err());
    }
}
