// SPDX-License-Identifier: Apache-2.0

//! The proxy pool selector: named endpoint pools with round-robin,
//! random-with-recency-avoidance, and sticky-with-TTL selection strategies
//! (spec §4.4).

pub mod pool;
pub mod registry;
pub mod types;

pub use pool::{ProxyPool, SelectionContext};
pub use registry::ProxyPoolRegistry;
pub use types::{
    PoolValidationError, PoolValidationWarning, ProxyEndpoint, ProxyPoolConfig, ProxyProtocol,
    SelectionStrategy, StickyConfig, StickyScope,
};
