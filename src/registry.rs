//! Policy registry: maps policy names to configured limiter instances.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{PolicyConfig, RegistryConfig};
use crate::error::{Result, TurnstileError};
use crate::limiter::Limiter;

/// A registered policy: a limiter plus the opaque rejection code the
/// request pipeline surfaces when this policy rejects a request.
pub struct Policy {
    name: String,
    rejection_code: u32,
    limiter: Limiter,
}

impl Policy {
    /// The policy name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The opaque rejection code configured for this policy. The registry
    /// never interprets it; the pipeline maps it to a transport response.
    pub fn rejection_code(&self) -> u32 {
        self.rejection_code
    }

    /// The limiter backing this policy.
    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .field("rejection_code", &self.rejection_code)
            .finish_non_exhaustive()
    }
}

/// Maps policy names to configured limiters.
///
/// Policies are registered at configuration time and are immutable
/// thereafter; each policy's ledger, queue, and replenishment timer are
/// fully isolated from every other policy's. [`Registry::shutdown`] tears
/// down all background timers and resolves queued acquisitions ungranted.
pub struct Registry {
    policies: DashMap<String, Arc<Policy>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            policies: DashMap::new(),
        }
    }

    /// Build a registry from a full policy configuration.
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let registry = Self::new();
        for (name, policy) in &config.policies {
            registry.register(name.clone(), policy.clone())?;
        }
        Ok(registry)
    }

    /// Register a policy under a unique name.
    ///
    /// Validates the configuration and constructs the limiter (spawning
    /// its replenishment timer where the discipline needs one), so this
    /// must be called from within a tokio runtime. Fails on invalid
    /// configuration or a duplicate name.
    pub fn register(&self, name: impl Into<String>, config: PolicyConfig) -> Result<()> {
        let name = name.into();
        let limiter = Limiter::new(&config.limiter)?;

        match self.policies.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                limiter.shutdown();
                Err(TurnstileError::Config(format!(
                    "policy '{}' is already registered",
                    name
                )))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                info!(
                    policy = %name,
                    rejection_code = config.rejection_code,
                    "Registered rate limiting policy"
                );
                entry.insert(Arc::new(Policy {
                    name,
                    rejection_code: config.rejection_code,
                    limiter,
                }));
                Ok(())
            }
        }
    }

    /// Look up a policy by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<Policy>> {
        self.policies
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TurnstileError::UnknownPolicy(name.to_string()))
    }

    /// Number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the registry has no policies.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Tear down every policy: stop replenishment timers and resolve all
    /// queued acquisitions as ungranted.
    pub fn shutdown(&self) {
        for entry in self.policies.iter() {
            debug!(policy = %entry.name(), "Shutting down policy");
            entry.limiter().shutdown();
        }
        info!(policies = self.policies.len(), "Registry shut down");
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
