// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Hostname routing table for the reverse proxy.
//
// Targets are validated and parsed once at registration; lookups hand out
// the same cached `Arc<Service>` so the hot path never re-parses URLs.

use crate::security::{self, SecurityError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid hostname {hostname:?}: {source}")]
    InvalidHostname {
        hostname: String,
        source: SecurityError,
    },
    #[error("hostname {0:?} is reserved")]
    Reserved(String),
    #[error("hostname {0:?} already registered")]
    AlreadyRegistered(String),
    #[error("invalid target: {0}")]
    InvalidTarget(#[from] SecurityError),
}

/// A routed backend. `target` is the parsed origin the proxy forwards to.
#[derive(Debug)]
pub struct Service {
    pub hostname: String,
    pub target: Url,
    pub agent: String,
    /// Registered at runtime through the admin API rather than from config.
    pub dynamic: bool,
}

#[derive(Default)]
pub struct Registry {
    routes: RwLock<HashMap<String, Arc<Service>>>,
    reserved: RwLock<HashSet<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a hostname as unroutable (the orchestrator's own endpoints).
    pub fn reserve_hostname(&self, hostname: impl Into<String>) {
        self.reserved.write().unwrap().insert(hostname.into());
    }

    pub fn register(&self, hostname: &str, target: &str, agent: &str) -> Result<(), RegistryError> {
        self.register_service(hostname, target, agent, false)
    }

    pub fn register_dynamic(
        &self,
        hostname: &str,
        target: &str,
        agent: &str,
    ) -> Result<(), RegistryError> {
        self.register_service(hostname, target, agent, true)
    }

    fn register_service(
        &self,
        hostname: &str,
        target: &str,
        agent: &str,
        dynamic: bool,
    ) -> Result<(), RegistryError> {
        security::validate_hostname(hostname).map_err(|source| RegistryError::InvalidHostname {
            hostname: hostname.to_string(),
            source,
        })?;
        if self.reserved.read().unwrap().contains(hostname) {
            return Err(RegistryError::Reserved(hostname.to_string()));
        }
        let target = security::validate_target_url(target)?;

        let mut routes = self.routes.write().unwrap();
        if routes.contains_key(hostname) {
            return Err(RegistryError::AlreadyRegistered(hostname.to_string()));
        }
        routes.insert(
            hostname.to_string(),
            Arc::new(Service {
                hostname: hostname.to_string(),
                target,
                agent: agent.to_string(),
                dynamic,
            }),
        );
        Ok(())
    }

    pub fn deregister(&self, hostname: &str) -> bool {
        self.routes.write().unwrap().remove(hostname).is_some()
    }

    /// Removes every route owned by the given agent. Returns the hostnames
    /// that were dropped.
    pub fn deregister_agent(&self, agent: &str) -> Vec<String> {
        let mut routes = self.routes.write().unwrap();
        let doomed: Vec<String> = routes
            .iter()
            .filter(|(_, svc)| svc.agent == agent)
            .map(|(host, _)| host.clone())
            .collect();
        for host in &doomed {
            routes.remove(host);
        }
        doomed
    }

    pub fn lookup(&self, hostname: &str) -> Option<Arc<Service>> {
        self.routes.read().unwrap().get(hostname).cloned()
    }

    pub fn list(&self) -> Vec<Arc<Service>> {
        let mut services: Vec<_> = self.routes.read().unwrap().values().cloned().collect();
        services.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        services
    }

    pub fn list_dynamic(&self) -> Vec<Arc<Service>> {
        self.list().into_iter().filter(|s| s.dynamic).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().unwrap().is_empty()
    }
}
