//! In-memory function-name to endpoint map.
//!
//! Uses DashMap so concurrent register/lookup workers never take a global
//! lock. Two writers racing on the same name resolve as last-writer-wins.

use crate::config::Endpoint;
use dashmap::DashMap;

/// Whether a registration created the entry or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    Updated,
}

/// Name to endpoint mapping owned by one registry instance.
///
/// Entries have no TTL and no liveness check; they live until overwritten,
/// removed, or the table is cleared.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Endpoint>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the endpoint for `function_name`.
    pub fn register(&self, function_name: &str, host: &str, port: u16) -> RegistrationOutcome {
        match self
            .services
            .insert(function_name.to_string(), Endpoint::new(host, port))
        {
            None => RegistrationOutcome::Registered,
            Some(_) => RegistrationOutcome::Updated,
        }
    }

    pub fn lookup(&self, function_name: &str) -> Option<Endpoint> {
        self.services
            .get(function_name)
            .map(|entry| entry.value().clone())
    }

    /// Returns `true` if an entry was removed.
    pub fn unregister(&self, function_name: &str) -> bool {
        self.services.remove(function_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Registered names, sorted.
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.services.clear();
    }
}
