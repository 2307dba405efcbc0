/*!
 * Builtin Services
 * The four stock collaborators wired up at boot
 *
 * Each one implements the `Service` trait only; the kernel reaches them
 * exclusively through the registry's health gate.
 */

use super::{Service, ServiceError, ServiceResult};
use ahash::RandomState;
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

fn missing_arg(service: &str, op: &str) -> ServiceError {
    ServiceError::OperationFailed(format!("{}: '{}' needs more arguments", service, op))
}

/// In-memory filesystem store
///
/// Flat namespace, string contents. Enough surface to demonstrate the
/// health gate on a stateful service.
pub struct FsService {
    files: RwLock<BTreeMap<String, String>>,
}

impl FsService {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for FsService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for FsService {
    fn start(&self) -> ServiceResult<()> {
        info!("fs: started");
        Ok(())
    }

    fn stop(&self) -> ServiceResult<()> {
        self.files.write().clear();
        info!("fs: stopped");
        Ok(())
    }

    fn health_check(&self) -> ServiceResult<()> {
        // Exercise the store end to end
        let mut files = self.files.write();
        files.insert(".probe".into(), "ok".into());
        let ok = files.get(".probe").map(String::as_str) == Some("ok");
        files.remove(".probe");
        if ok {
            Ok(())
        } else {
            Err(ServiceError::OperationFailed("fs: store probe failed".into()))
        }
    }

    fn operation(&self, op: &str, args: &[&str]) -> ServiceResult<String> {
        match op {
            "write" => {
                let name = args.first().ok_or_else(|| missing_arg("fs", op))?;
                let content = args[1..].join(" ");
                let bytes = content.len();
                self.files.write().insert(name.to_string(), content);
                debug!("fs: wrote '{}' ({} bytes)", name, bytes);
                Ok(format!("wrote {} bytes to {}", bytes, name))
            }
            "read" => {
                let name = args.first().ok_or_else(|| missing_arg("fs", op))?;
                self.files
                    .read()
                    .get(*name)
                    .cloned()
                    .ok_or_else(|| ServiceError::OperationFailed(format!("fs: no file '{}'", name)))
            }
            "delete" => {
                let name = args.first().ok_or_else(|| missing_arg("fs", op))?;
                self.files
                    .write()
                    .remove(*name)
                    .map(|_| format!("deleted {}", name))
                    .ok_or_else(|| ServiceError::OperationFailed(format!("fs: no file '{}'", name)))
            }
            "list" => {
                let files = self.files.read();
                Ok(files.keys().cloned().collect::<Vec<_>>().join("\n"))
            }
            _ => Err(ServiceError::UnknownOperation {
                service: "fs".into(),
                op: op.to_string(),
            }),
        }
    }
}

/// Network simulator
///
/// DNS resolution is deterministic: unknown hostnames map to a stable
/// 192.168.x.y derived from the name, so repeated lookups agree without a
/// real resolver.
pub struct NetService {
    dns_cache: RwLock<HashMap<String, String>>,
    hasher: RandomState,
}

impl NetService {
    pub fn new() -> Self {
        let mut seeded = HashMap::new();
        seeded.insert("localhost".to_string(), "127.0.0.1".to_string());
        Self {
            dns_cache: RwLock::new(seeded),
            // Fixed keys so resolution survives restarts
            hasher: RandomState::with_seeds(7, 11, 13, 17),
        }
    }

    fn derive_ip(&self, hostname: &str) -> String {
        let mut h = self.hasher.build_hasher();
        hostname.hash(&mut h);
        let v = h.finish();
        format!("192.168.{}.{}", (v >> 8) as u8 % 254 + 1, v as u8 % 254 + 1)
    }

    fn valid_ipv4(addr: &str) -> bool {
        let parts: Vec<&str> = addr.split('.').collect();
        parts.len() == 4 && parts.iter().all(|p| p.parse::<u8>().is_ok())
    }
}

impl Default for NetService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for NetService {
    fn start(&self) -> ServiceResult<()> {
        info!("net: started");
        Ok(())
    }

    fn stop(&self) -> ServiceResult<()> {
        info!("net: stopped");
        Ok(())
    }

    fn health_check(&self) -> ServiceResult<()> {
        let resolved = self.operation("resolve", &["localhost"])?;
        if resolved == "127.0.0.1" {
            Ok(())
        } else {
            Err(ServiceError::OperationFailed(
                "net: loopback resolution failed".into(),
            ))
        }
    }

    fn operation(&self, op: &str, args: &[&str]) -> ServiceResult<String> {
        match op {
            "resolve" => {
                let hostname = args.first().ok_or_else(|| missing_arg("net", op))?;
                if let Some(ip) = self.dns_cache.read().get(*hostname) {
                    debug!("net: {} -> {} (cache)", hostname, ip);
                    return Ok(ip.clone());
                }
                let ip = self.derive_ip(hostname);
                debug!("net: {} -> {} (resolved)", hostname, ip);
                self.dns_cache
                    .write()
                    .insert(hostname.to_string(), ip.clone());
                Ok(ip)
            }
            "ping" => {
                let addr = args.first().ok_or_else(|| missing_arg("net", op))?;
                if !Self::valid_ipv4(addr) {
                    return Err(ServiceError::OperationFailed(format!(
                        "net: invalid address '{}'",
                        addr
                    )));
                }
                Ok(format!("reply from {}: ttl=64", addr))
            }
            _ => Err(ServiceError::UnknownOperation {
                service: "net".into(),
                op: op.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct Device {
    name: String,
    kind: &'static str,
    online: bool,
}

/// Device driver emulator with a fixed default device set
pub struct DriverService {
    devices: RwLock<BTreeMap<String, Device>>,
}

impl DriverService {
    pub fn new() -> Self {
        let mut devices = BTreeMap::new();
        for (id, name, kind) in [
            ("hdd0", "Primary Disk", "storage"),
            ("eth0", "Ethernet Adapter", "network"),
            ("kbd0", "Keyboard", "input"),
            ("display0", "Monitor", "display"),
        ] {
            devices.insert(
                id.to_string(),
                Device {
                    name: name.to_string(),
                    kind,
                    online: true,
                },
            );
        }
        Self {
            devices: RwLock::new(devices),
        }
    }

    fn device(&self, id: &str) -> ServiceResult<Device> {
        self.devices
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::OperationFailed(format!("driver: no device '{}'", id)))
    }
}

impl Default for DriverService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for DriverService {
    fn start(&self) -> ServiceResult<()> {
        info!("driver: started ({} devices)", self.devices.read().len());
        Ok(())
    }

    fn stop(&self) -> ServiceResult<()> {
        for dev in self.devices.write().values_mut() {
            dev.online = false;
        }
        info!("driver: stopped");
        Ok(())
    }

    fn health_check(&self) -> ServiceResult<()> {
        if self.devices.read().values().any(|d| d.online) {
            Ok(())
        } else {
            Err(ServiceError::OperationFailed("driver: no device online".into()))
        }
    }

    fn operation(&self, op: &str, args: &[&str]) -> ServiceResult<String> {
        match op {
            "list" => {
                let devices = self.devices.read();
                Ok(devices
                    .iter()
                    .map(|(id, d)| {
                        format!(
                            "{}  {}  [{}]  {}",
                            id,
                            d.name,
                            d.kind,
                            if d.online { "online" } else { "offline" }
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            "info" => {
                let id = args.first().ok_or_else(|| missing_arg("driver", op))?;
                let d = self.device(id)?;
                Ok(format!("{}: {} [{}] online={}", id, d.name, d.kind, d.online))
            }
            "read" => {
                let id = args.first().ok_or_else(|| missing_arg("driver", op))?;
                let size: usize = args
                    .get(1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1024);
                let d = self.device(id)?;
                if !d.online {
                    return Err(ServiceError::OperationFailed(format!(
                        "driver: device '{}' is offline",
                        id
                    )));
                }
                Ok(format!("read {} bytes from {}", size, id))
            }
            "write" => {
                let id = args.first().ok_or_else(|| missing_arg("driver", op))?;
                let payload = args[1..].join(" ");
                let d = self.device(id)?;
                if !d.online {
                    return Err(ServiceError::OperationFailed(format!(
                        "driver: device '{}' is offline",
                        id
                    )));
                }
                Ok(format!("wrote {} bytes to {}", payload.len(), id))
            }
            _ => Err(ServiceError::UnknownOperation {
                service: "driver".into(),
                op: op.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    username: String,
    created_at: Instant,
}

/// Credential store with expiring sessions and an optional audit trail
///
/// Sessions expire lazily: validity is evaluated when a token is checked,
/// not by a background sweeper.
pub struct SecurityService {
    users: RwLock<HashMap<String, String>>,
    sessions: RwLock<HashMap<String, Session>>,
    audit_log: RwLock<Vec<String>>,
    session_timeout: Duration,
    enable_audit: bool,
    next_token: AtomicU64,
}

impl SecurityService {
    pub fn new(session_timeout: Duration, enable_audit: bool) -> Self {
        let mut users = HashMap::new();
        users.insert("admin".to_string(), "admin123".to_string());
        users.insert("user".to_string(), "user123".to_string());
        Self {
            users: RwLock::new(users),
            sessions: RwLock::new(HashMap::new()),
            audit_log: RwLock::new(Vec::new()),
            session_timeout,
            enable_audit,
            next_token: AtomicU64::new(1),
        }
    }

    fn audit(&self, event: impl Into<String>) {
        if self.enable_audit {
            self.audit_log.write().push(event.into());
        }
    }

    fn expired(&self, session: &Session) -> bool {
        session.created_at.elapsed() > self.session_timeout
    }
}

impl Service for SecurityService {
    fn start(&self) -> ServiceResult<()> {
        info!(
            "security: started (session timeout {:?}, audit {})",
            self.session_timeout,
            if self.enable_audit { "on" } else { "off" }
        );
        Ok(())
    }

    fn stop(&self) -> ServiceResult<()> {
        self.sessions.write().clear();
        info!("security: stopped, sessions revoked");
        Ok(())
    }

    fn health_check(&self) -> ServiceResult<()> {
        if self.users.read().is_empty() {
            return Err(ServiceError::OperationFailed(
                "security: credential store is empty".into(),
            ));
        }
        Ok(())
    }

    fn operation(&self, op: &str, args: &[&str]) -> ServiceResult<String> {
        match op {
            "login" => {
                let (user, pass) = match args {
                    [user, pass, ..] => (*user, *pass),
                    _ => return Err(missing_arg("security", op)),
                };
                let ok = self.users.read().get(user).map(String::as_str) == Some(pass);
                if !ok {
                    self.audit(format!("login denied for '{}'", user));
                    return Err(ServiceError::OperationFailed(format!(
                        "security: invalid credentials for '{}'",
                        user
                    )));
                }
                let token = format!(
                    "tok-{:08x}",
                    self.next_token.fetch_add(1, Ordering::SeqCst)
                );
                self.sessions.write().insert(
                    token.clone(),
                    Session {
                        username: user.to_string(),
                        created_at: Instant::now(),
                    },
                );
                self.audit(format!("login ok for '{}'", user));
                Ok(token)
            }
            "check" => {
                let token = args.first().ok_or_else(|| missing_arg("security", op))?;
                let mut sessions = self.sessions.write();
                match sessions.get(*token) {
                    Some(s) if self.expired(s) => {
                        let user = s.username.clone();
                        sessions.remove(*token);
                        self.audit(format!("session expired for '{}'", user));
                        Err(ServiceError::OperationFailed(
                            "security: session expired".into(),
                        ))
                    }
                    Some(s) => Ok(format!("valid session for {}", s.username)),
                    None => Err(ServiceError::OperationFailed(
                        "security: unknown session token".into(),
                    )),
                }
            }
            "logout" => {
                let token = args.first().ok_or_else(|| missing_arg("security", op))?;
                match self.sessions.write().remove(*token) {
                    Some(s) => {
                        self.audit(format!("logout for '{}'", s.username));
                        Ok(format!("logged out {}", s.username))
                    }
                    None => Err(ServiceError::OperationFailed(
                        "security: unknown session token".into(),
                    )),
                }
            }
            "audit" => {
                if !self.enable_audit {
                    return Err(ServiceError::OperationFailed(
                        "security: audit log disabled".into(),
                    ));
                }
                Ok(self.audit_log.read().join("\n"))
            }
            _ => Err(ServiceError::UnknownOperation {
                service: "security".into(),
                op: op.to_string(),
            }),
        }
    }
}
