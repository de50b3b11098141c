use std::sync::{Arc, Once};

use log::{info, warn};
use proxy_types::{Config, Registry};

/// Deregisters a proxy from the registry on orderly or signal-induced
/// termination. Hooks are idempotent: calling [`LifecycleHooks::run`]
/// more than once only deregisters once, so both an explicit `shutdown()`
/// call and a `SignalSource` callback wired by the host binary can invoke it
/// safely.
pub struct LifecycleHooks {
    config: Arc<Config>,
    registry: Arc<dyn Registry>,
    once: Once,
}

impl LifecycleHooks {
    pub fn new(config: Arc<Config>, registry: Arc<dyn Registry>) -> Self {
        Self {
            config,
            registry,
            once: Once::new(),
        }
    }

    /// Delete this proxy's registry entries. Safe to call more than once;
    /// only the first call has any effect. Deregistration errors are logged
    /// rather than propagated, since there is no caller left to hand a
    /// `Result` to once shutdown has begun.
    pub fn run(&self) {
        self.once.call_once(|| self.deregister());
    }

    fn deregister(&self) {
        let self_key = self
            .config
            .group_name
            .roster_key(&self.config.component_type);
        match self.registry.hdel(&self_key, self.config.component_name.as_str()) {
            Ok(()) => info!(
                "lifecycle: deregistered {} from {self_key}",
                self.config.component_name
            ),
            Err(err) => warn!(
                "lifecycle: failed to deregister {} from {self_key}: {err}",
                self.config.component_name
            ),
        }

        if self.config.enable_rejoin {
            if let Err(err) = self
                .registry
                .hdel("component-container-mapping", self.config.component_name.as_str())
            {
                warn!("lifecycle: failed to clear container mapping: {err}");
            }
            if let Some(job) = &self.config.job_name {
                let key = format!("{job}:component_name_to_container_name");
                if let Err(err) = self.registry.hdel(&key, self.config.component_name.as_str()) {
                    warn!("lifecycle: failed to clear job container mapping: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryRegistry;
    use proxy_types::ComponentName;
    use std::collections::HashMap;

    fn config() -> Arc<Config> {
        Arc::new(
            Config::builder("g", "actor", HashMap::new())
                .component_name(ComponentName::new("a1"))
                .build(),
        )
    }

    #[test]
    fn run_is_idempotent() {
        let registry = Arc::new(InMemoryRegistry::new());
        let cfg = config();
        registry
            .hset(&cfg.group_name.roster_key(&cfg.component_type), "a1", "\"addr\"")
            .unwrap();

        let hooks = LifecycleHooks::new(cfg.clone(), registry.clone());
        hooks.run();
        hooks.run();

        assert_eq!(
            registry
                .hlen(&cfg.group_name.roster_key(&cfg.component_type))
                .unwrap(),
            0
        );
    }
}
