/*!
 * Service Registry
 * Named service handles with a health gate in front of every call
 */

use super::{Health, Service, ServiceError, ServiceResult};
use ahash::RandomState;
use dashmap::DashMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One row of the `status` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServiceStatus {
    pub name: String,
    pub health: Health,
}

struct Handle {
    service: Arc<dyn Service>,
    health: Health,
}

/// Health-gated service registry
///
/// Every operation on a service passes through the gate first: a failed
/// service rejects the call with no side effect on the collaborator.
pub struct ServiceRegistry {
    handles: Arc<DashMap<String, Handle, RandomState>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        info!("Service registry initialized");
        Self {
            handles: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    /// Register and start a service under a unique name
    pub fn register(&self, name: impl Into<String>, service: Box<dyn Service>) -> ServiceResult<()> {
        let name = name.into();
        if self.handles.contains_key(&name) {
            return Err(ServiceError::DuplicateName(name));
        }

        let service: Arc<dyn Service> = Arc::from(service);
        service.start()?;

        info!("Service '{}' registered (healthy)", name);
        self.handles.insert(
            name,
            Handle {
                service,
                health: Health::Healthy,
            },
        );
        Ok(())
    }

    /// Simulate a crash: every later call is rejected until recovery
    pub fn mark_failed(&self, name: &str) -> ServiceResult<()> {
        let mut handle = self.handle_mut(name)?;
        handle.health = Health::Failed;
        warn!("Service '{}' marked failed", name);
        Ok(())
    }

    /// Restore a failed service to full operation
    pub fn mark_recovered(&self, name: &str) -> ServiceResult<()> {
        let mut handle = self.handle_mut(name)?;
        handle.health = Health::Healthy;
        info!("Service '{}' recovered", name);
        Ok(())
    }

    pub fn health(&self, name: &str) -> ServiceResult<Health> {
        self.handles
            .get(name)
            .map(|h| h.health)
            .ok_or_else(|| ServiceError::UnknownService(name.to_string()))
    }

    /// Run an operation through the health gate
    pub fn call(&self, name: &str, op: &str, args: &[&str]) -> ServiceResult<String> {
        let service = self.gate(name)?;
        service.operation(op, args)
    }

    /// Run the collaborator's canonical self-test through the health gate
    pub fn test(&self, name: &str) -> ServiceResult<()> {
        let service = self.gate(name)?;
        service.health_check()
    }

    /// All registered services and their health, name-sorted
    pub fn status(&self) -> Vec<ServiceStatus> {
        let mut all: Vec<ServiceStatus> = self
            .handles
            .iter()
            .map(|entry| ServiceStatus {
                name: entry.key().clone(),
                health: entry.health,
            })
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn count(&self) -> usize {
        self.handles.len()
    }

    /// Stop every service; used at shutdown
    pub fn stop_all(&self) {
        for entry in self.handles.iter() {
            if let Err(e) = entry.service.stop() {
                warn!("Stopping service '{}': {}", entry.key(), e);
            }
        }
    }

    /// The gate: resolve the handle, reject if failed, hand out the
    /// collaborator without holding the map entry during the call
    fn gate(&self, name: &str) -> ServiceResult<Arc<dyn Service>> {
        let handle = self
            .handles
            .get(name)
            .ok_or_else(|| ServiceError::UnknownService(name.to_string()))?;
        if handle.health == Health::Failed {
            return Err(ServiceError::Unavailable(name.to_string()));
        }
        Ok(Arc::clone(&handle.service))
    }

    fn handle_mut(
        &self,
        name: &str,
    ) -> ServiceResult<dashmap::mapref::one::RefMut<'_, String, Handle, RandomState>> {
        self.handles
            .get_mut(name)
            .ok_or_else(|| ServiceError::UnknownService(name.to_string()))
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ServiceRegistry {
    fn clone(&self) -> Self {
        Self {
            handles: Arc::clone(&self.handles),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts operation calls so tests can prove the gate short-circuits
    struct Probe {
        calls: Arc<AtomicUsize>,
    }

    impl Service for Probe {
        fn start(&self) -> ServiceResult<()> {
            Ok(())
        }
        fn stop(&self) -> ServiceResult<()> {
            Ok(())
        }
        fn health_check(&self) -> ServiceResult<()> {
            Ok(())
        }
        fn operation(&self, op: &str, _args: &[&str]) -> ServiceResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("ran {}", op))
        }
    }

    fn probe() -> (Box<Probe>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Probe {
                calls: Arc::clone(&calls),
            }),
            calls,
        )
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let reg = ServiceRegistry::new();
        reg.register("fs", probe().0).unwrap();
        assert_eq!(
            reg.register("fs", probe().0),
            Err(ServiceError::DuplicateName("fs".into()))
        );
    }

    #[test]
    fn test_failed_service_rejects_calls_without_side_effect() {
        let reg = ServiceRegistry::new();
        let (svc, calls) = probe();
        reg.register("fs", svc).unwrap();

        reg.mark_failed("fs").unwrap();
        assert_eq!(
            reg.call("fs", "write", &[]),
            Err(ServiceError::Unavailable("fs".into()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        reg.mark_recovered("fs").unwrap();
        assert_eq!(reg.call("fs", "write", &[]).unwrap(), "ran write");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_is_isolated_per_service() {
        let reg = ServiceRegistry::new();
        reg.register("fs", probe().0).unwrap();
        reg.register("net", probe().0).unwrap();

        reg.mark_failed("fs").unwrap();
        assert!(reg.call("net", "resolve", &["example.org"]).is_ok());
        assert_eq!(reg.health("fs").unwrap(), Health::Failed);
        assert_eq!(reg.health("net").unwrap(), Health::Healthy);
    }

    #[test]
    fn test_test_respects_gate() {
        let reg = ServiceRegistry::new();
        reg.register("fs", probe().0).unwrap();

        assert!(reg.test("fs").is_ok());
        reg.mark_failed("fs").unwrap();
        assert_eq!(reg.test("fs"), Err(ServiceError::Unavailable("fs".into())));
    }

    #[test]
    fn test_unknown_service() {
        let reg = ServiceRegistry::new();
        assert_eq!(
            reg.mark_failed("ghost"),
            Err(ServiceError::UnknownService("ghost".into()))
        );
    }

    #[test]
    fn test_status_sorted_by_name() {
        let reg = ServiceRegistry::new();
        reg.register("net", probe().0).unwrap();
        reg.register("fs", probe().0).unwrap();

        let names: Vec<String> = reg.status().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["fs", "net"]);
    }
}
