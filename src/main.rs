/*!
 * mksim
 * Boots the kernel, registers the builtin services, and hands control to
 * the interactive shell
 */

use anyhow::Result;
use microkernel_sim::config::KernelConfig;
use microkernel_sim::kernel::Kernel;
use microkernel_sim::services::{DriverService, FsService, NetService, SecurityService};
use microkernel_sim::shell::Shell;
use std::time::Duration;

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "kernel.json".to_string());
    let config = KernelConfig::load(&config_path)?;

    let default_level = if config.kernel.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level),
    )
    .init();

    let kernel = Kernel::new(config);

    let security = SecurityService::new(
        Duration::from_secs(kernel.config().security.session_timeout_secs),
        kernel.config().security.enable_audit,
    );
    kernel.register_service("fs", Box::new(FsService::new()))?;
    kernel.register_service("net", Box::new(NetService::new()))?;
    kernel.register_service("driver", Box::new(DriverService::new()))?;
    kernel.register_service("security", Box::new(security))?;

    let stdin = std::io::stdin();
    Shell::new(&kernel).run(stdin.lock(), std::io::stdout())?;

    kernel.services().stop_all();
    Ok(())
}
