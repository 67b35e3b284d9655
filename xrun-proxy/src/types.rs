// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    RoundRobin,
    Random,
    Sticky,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickyScope {
    Job,
    Domain,
    Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickyConfig {
    pub scope: StickyScope,
    pub ttl_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyPoolConfig {
    pub name: String,
    pub endpoints: Vec<ProxyEndpoint>,
    pub strategy: SelectionStrategy,
    #[serde(default)]
    pub sticky: Option<StickyConfig>,
    #[serde(default)]
    pub recency_window: Option<usize>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolValidationError {
    #[error("pool `{0}` has no endpoints")]
    EmptyEndpointSet(String),

    #[error("pool `{pool}` endpoint {index} has password without username (or vice versa)")]
    MismatchedCredentials { pool: String, index: usize },

    #[error("pool `{pool}` endpoint {index} has out-of-range port {port}")]
    PortOutOfRange { pool: String, index: usize, port: u32 },
}

/// A warning surfaced but not rejected (spec §4.4 "Soft warnings").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolValidationWarning {
    StickyConfigOnNonStickyStrategy,
    RecencyWindowOnNonRandomStrategy,
}

impl ProxyPoolConfig {
    pub fn validate(&self) -> Result<Vec<PoolValidationWarning>, PoolValidationError> {
        if self.endpoints.is_empty() {
            return Err(PoolValidationError::EmptyEndpointSet(self.name.clone()));
        }

        for (index, ep) in self.endpoints.iter().enumerate() {
            if ep.username.is_some() != ep.password.is_some() {
                return Err(PoolValidationError::MismatchedCredentials {
                    pool: self.name.clone(),
                    index,
                });
            }
            if ep.port == 0 {
                return Err(PoolValidationError::PortOutOfRange {
                    pool: self.name.clone(),
                    index,
                    port: ep.port as u32,
                });
            }
        }

        let mut warnings = Vec::new();
        if self.sticky.is_some() && self.strategy != SelectionStrategy::Sticky {
            warnings.push(PoolValidationWarning::StickyConfigOnNonStickyStrategy);
        }
        if self.recency_window.is_some() && self.strategy != SelectionStrategy::Random {
            warnings.push(PoolValidationWarning::RecencyWindowOnNonRandomStrategy);
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(username: Option<&str>, password: Option<&str>) -> ProxyEndpoint {
        ProxyEndpoint {
            protocol: ProxyProtocol::Http,
            host: "proxy.example".into(),
            port: 8080,
            username: username.map(String::from),
            password: password.map(String::from),
        }
    }

    fn config(endpoints: Vec<ProxyEndpoint>) -> ProxyPoolConfig {
        ProxyPoolConfig {
            name: "pool-a".into(),
            endpoints,
            strategy: SelectionStrategy::RoundRobin,
            sticky: None,
            recency_window: None,
        }
    }

    #[test]
    fn rejects_empty_pool() {
        let cfg = config(vec![]);
        assert_eq!(
            cfg.validate(),
            Err(PoolValidationError::EmptyEndpointSet("pool-a".into()))
        );
    }

    #[test]
    fn rejects_password_without_username() {
        let cfg = config(vec![endpoint(None, Some("secret"))]);
        assert!(matches!(
            cfg.validate(),
            Err(PoolValidationError::MismatchedCredentials { .. })
        ));
    }

    #[test]
    fn sticky_config_on_round_robin_is_a_warning_not_a_rejection() {
        let mut cfg = config(vec![endpoint(None, None)]);
        cfg.sticky = Some(StickyConfig {
            scope: StickyScope::Job,
            ttl_ms: Some(1000),
        });
        let warnings = cfg.validate().unwrap();
        assert_eq!(
            warnings,
            vec![PoolValidationWarning::StickyConfigOnNonStickyStrategy]
        );
    }
}
