// SPDX-License-Identifier: Apache-2.0

use crate::pool::ProxyPool;
use crate::types::{PoolValidationError, PoolValidationWarning, ProxyPoolConfig};
use std::collections::HashMap;

/// Named collection of proxy pools the orchestrator selects from by name
/// (spec §4.4 "Given a named pool and a selection request").
#[derive(Default)]
pub struct ProxyPoolRegistry {
    pools: HashMap<String, ProxyPool>,
}

impl ProxyPoolRegistry {
    pub fn new() -> Self {
        ProxyPoolRegistry {
            pools: HashMap::new(),
        }
    }

    /// Validates and registers a pool. Returns soft warnings that do not
    /// prevent registration.
    pub fn register(
        &mut self,
        config: ProxyPoolConfig,
    ) -> Result<Vec<PoolValidationWarning>, PoolValidationError> {
        let warnings = config.validate()?;
        let name = config.name.clone();
        self.pools.insert(name, ProxyPool::new(config));
        Ok(warnings)
    }

    pub fn get(&self, name: &str) -> Option<&ProxyPool> {
        self.pools.get(name)
    }
}
