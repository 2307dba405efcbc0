/*!
 * Control Shell
 * Line-oriented surface over the kernel's control operations
 */

use crate::kernel::Kernel;
use std::io::{self, BufRead, Write};

const HELP: &str = "\
commands:
  status                    list every service and its health
  fail <service>            mark a service failed
  recover <service>         restore a failed service
  test [service]            run the self-test of one or all services
  call <service> <op> [..]  invoke a service operation
  ps                        list processes
  mem                       show memory accounting
  stats                     show kernel statistics
  help                      this text
  exit                      leave the shell";

/// What a processed line asks the caller to do next
#[derive(Debug, PartialEq, Eq)]
pub enum ShellOutcome {
    /// Print this and read the next line
    Output(String),
    /// Terminate the loop
    Quit,
}

pub struct Shell<'a> {
    kernel: &'a Kernel,
}

impl<'a> Shell<'a> {
    pub fn new(kernel: &'a Kernel) -> Self {
        Self { kernel }
    }

    /// Read commands until `exit` or end of input
    pub fn run(&self, input: impl BufRead, mut output: impl Write) -> io::Result<()> {
        writeln!(output, "microkernel shell; 'help' lists commands")?;
        write!(output, "> ")?;
        output.flush()?;
        for line in input.lines() {
            let line = line?;
            match self.handle_line(&line) {
                ShellOutcome::Output(text) => {
                    if !text.is_empty() {
                        writeln!(output, "{}", text)?;
                    }
                    write!(output, "> ")?;
                    output.flush()?;
                }
                ShellOutcome::Quit => break,
            }
        }
        Ok(())
    }

    /// Execute one command line
    pub fn handle_line(&self, line: &str) -> ShellOutcome {
        let words: Vec<&str> = line.split_whitespace().collect();
        let output = match words.as_slice() {
            [] => String::new(),
            ["exit"] | ["quit"] => return ShellOutcome::Quit,
            ["help"] => HELP.to_string(),
            ["status"] => self.status(),
            ["fail", name] => self.report(self.kernel.fail_service(name), || {
                format!("{} marked failed", name)
            }),
            ["recover", name] => self.report(self.kernel.recover_service(name), || {
                format!("{} recovered", name)
            }),
            ["test"] => self.test_all(),
            ["test", name] => self.test_one(name),
            ["call", name, op, args @ ..] => match self.kernel.call_service(name, op, args) {
                Ok(result) => result,
                Err(e) => format!("error: {}", e),
            },
            ["ps"] => self.ps(),
            ["mem"] => self.mem(),
            ["stats"] => match serde_json::to_string_pretty(&self.kernel.stats()) {
                Ok(json) => json,
                Err(e) => format!("error: {}", e),
            },
            _ => format!("unknown command: '{}' ('help' lists commands)", line.trim()),
        };
        ShellOutcome::Output(output)
    }

    fn report(
        &self,
        result: crate::core::Result<()>,
        ok: impl FnOnce() -> String,
    ) -> String {
        match result {
            Ok(()) => ok(),
            Err(e) => format!("error: {}", e),
        }
    }

    fn status(&self) -> String {
        let statuses = self.kernel.service_status();
        if statuses.is_empty() {
            return "no services registered".to_string();
        }
        statuses
            .into_iter()
            .map(|s| format!("{:<12} {}", s.name, s.health))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn test_one(&self, name: &str) -> String {
        match self.kernel.test_service(name) {
            Ok(()) => format!("{}: ok", name),
            Err(e) => format!("{}: {}", name, e),
        }
    }

    fn test_all(&self) -> String {
        let statuses = self.kernel.service_status();
        if statuses.is_empty() {
            return "no services registered".to_string();
        }
        statuses
            .into_iter()
            .map(|s| self.test_one(&s.name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn ps(&self) -> String {
        let processes = self.kernel.processes().list();
        if processes.is_empty() {
            return "no processes".to_string();
        }
        let mut rows = vec![format!(
            "{:>5}  {:<16} {:>4}  {:<10} {:>10}",
            "PID", "NAME", "PRIO", "STATE", "MEMORY"
        )];
        rows.extend(processes.into_iter().map(|p| {
            format!(
                "{:>5}  {:<16} {:>4}  {:<10} {:>10}",
                p.pid,
                p.name,
                p.priority,
                format!("{:?}", p.state).to_lowercase(),
                p.memory_bytes
            )
        }));
        rows.join("\n")
    }

    fn mem(&self) -> String {
        let (total, used, available) = self.kernel.memory().info();
        format!(
            "memory: {} used / {} total ({} available, {} allocations)",
            used,
            total,
            available,
            self.kernel.memory().stats().allocations
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::services::{FsService, NetService};
    use pretty_assertions::assert_eq;

    fn kernel() -> Kernel {
        let k = Kernel::new(KernelConfig::default());
        k.register_service("fs", Box::new(FsService::new())).unwrap();
        k.register_service("net", Box::new(NetService::new())).unwrap();
        k
    }

    #[test]
    fn test_status_lists_health() {
        let k = kernel();
        let shell = Shell::new(&k);

        k.fail_service("fs").unwrap();
        match shell.handle_line("status") {
            ShellOutcome::Output(out) => {
                assert!(out.contains("fs"));
                assert!(out.contains("failed"));
                assert!(out.contains("healthy"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_fail_recover_round_trip() {
        let k = kernel();
        let shell = Shell::new(&k);

        shell.handle_line("fail fs");
        match shell.handle_line("test fs") {
            ShellOutcome::Output(out) => assert!(out.contains("marked failed")),
            other => panic!("unexpected outcome {:?}", other),
        }

        shell.handle_line("recover fs");
        assert_eq!(
            shell.handle_line("test fs"),
            ShellOutcome::Output("fs: ok".into())
        );
    }

    #[test]
    fn test_call_forwards_to_service() {
        let k = kernel();
        let shell = Shell::new(&k);

        shell.handle_line("call fs write notes hello");
        assert_eq!(
            shell.handle_line("call fs read notes"),
            ShellOutcome::Output("hello".into())
        );
    }

    #[test]
    fn test_exit_quits() {
        let k = kernel();
        let shell = Shell::new(&k);
        assert_eq!(shell.handle_line("exit"), ShellOutcome::Quit);
    }

    #[test]
    fn test_unknown_command_is_reported() {
        let k = kernel();
        let shell = Shell::new(&k);
        match shell.handle_line("frobnicate") {
            ShellOutcome::Output(out) => assert!(out.contains("unknown command")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
