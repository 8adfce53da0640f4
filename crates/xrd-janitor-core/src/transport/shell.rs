use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::{debug, trace};

use super::{ConnectionId, Host, OwnerGroup, Transport, TransportError};
use crate::config::AppConfig;

/// Quotes `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

fn describe(command: &Command) -> String {
    let mut description = command.get_program().to_string_lossy().into_owned();
    for arg in command.get_args() {
        description.push(' ');
        description.push_str(&arg.to_string_lossy());
    }
    description
}

/// Runs a command to completion and maps a non-zero status to an error.
fn run_command(mut command: Command) -> Result<(), TransportError> {
    let description = describe(&command);
    trace!("Running {}", description);
    let status = command.status().map_err(|source| TransportError::Spawn {
        command: description.clone(),
        source,
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(TransportError::Failed {
            command: description,
            code: status.code(),
        })
    }
}

/// Runs short shell scripts either locally (`sh -c`) or on a remote host
/// over ssh, optionally through a persistent per-worker control socket.
#[derive(Debug, Clone)]
pub struct RemoteShell {
    ssh_path: String,
    control_dir: PathBuf,
    control_persist_secs: u64,
}

impl RemoteShell {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ssh_path: config.ssh_path.clone(),
            control_dir: PathBuf::from(&config.control_dir),
            control_persist_secs: config.control_persist_secs,
        }
    }

    fn ssh_options(&self, host: &Host, conn: Option<&ConnectionId>) -> Vec<String> {
        let mut options = Vec::new();
        if let Some(conn) = conn {
            let control_path = self.control_dir.join(conn.socket_name());
            options.extend([
                "-o".to_string(),
                "ControlMaster=auto".to_string(),
                "-o".to_string(),
                format!("ControlPath={}", control_path.display()),
                "-o".to_string(),
                format!("ControlPersist={}", self.control_persist_secs),
            ]);
        }
        options.extend([
            "-o".to_string(),
            "Compression=no".to_string(),
            "-x".to_string(),
            "-T".to_string(),
            "-p".to_string(),
            host.port.to_string(),
            "-l".to_string(),
            host.user.clone(),
        ]);
        options
    }

    /// The ssh invocation as one string, for `rsync -e`.
    pub fn ssh_command_line(&self, host: &Host, conn: Option<&ConnectionId>) -> String {
        let mut line = self.ssh_path.clone();
        for option in self.ssh_options(host, conn) {
            line.push(' ');
            line.push_str(&option);
        }
        line
    }

    pub fn command(&self, host: &Host, conn: Option<&ConnectionId>, script: &str) -> Command {
        if host.is_local() {
            let mut command = Command::new("/bin/sh");
            command.arg("-c").arg(script);
            command
        } else {
            let mut command = Command::new(&self.ssh_path);
            command
                .args(self.ssh_options(host, conn))
                .arg(&host.host)
                .arg(script);
            command
        }
    }

    pub fn run(
        &self,
        host: &Host,
        conn: Option<&ConnectionId>,
        script: &str,
    ) -> Result<(), TransportError> {
        run_command(self.command(host, conn, script))
    }

    /// Starts `script` with its standard output piped back.
    pub fn spawn_reader(&self, host: &Host, script: &str) -> Result<Child, TransportError> {
        let mut command = self.command(host, None, script);
        command.stdout(Stdio::piped()).stdin(Stdio::null());
        let description = describe(&command);
        debug!("Starting {}", description);
        command.spawn().map_err(|source| TransportError::Spawn {
            command: description,
            source,
        })
    }

    /// Closes the master connection behind `conn`; failures are ignored.
    pub fn close(&self, host: &Host, conn: &ConnectionId) {
        if host.is_local() {
            return;
        }
        let control_path = self.control_dir.join(conn.socket_name());
        let _ = Command::new(&self.ssh_path)
            .arg("-O")
            .arg("exit")
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .arg(&host.host)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

/// [`Transport`] built from `mkdir`, `rsync`, `ln` and `chown`, run locally
/// or through ssh depending on the destination host.
pub struct ShellTransport {
    shell: RemoteShell,
    rsync_path: String,
    destination: Host,
}

impl ShellTransport {
    pub fn new(config: &AppConfig, destination: Host) -> Self {
        Self {
            shell: RemoteShell::from_config(config),
            rsync_path: config.rsync_path.clone(),
            destination,
        }
    }

    fn run(&self, conn: &ConnectionId, script: &str) -> Result<(), TransportError> {
        self.shell.run(&self.destination, Some(conn), script)
    }
}

impl Transport for ShellTransport {
    fn is_local(&self) -> bool {
        self.destination.is_local()
    }

    fn make_dirs(&self, conn: &ConnectionId, dirs: &[&Path]) -> Result<(), TransportError> {
        let mut script = "/bin/mkdir -p".to_string();
        for dir in dirs {
            script.push(' ');
            script.push_str(&quote_path(dir));
        }
        self.run(conn, &script)
    }

    fn copy_file(
        &self,
        conn: &ConnectionId,
        source: &Path,
        destination: &Path,
    ) -> Result<(), TransportError> {
        let mut command = Command::new(&self.rsync_path);
        command.arg("-a");
        if self.destination.is_local() {
            command.arg(source).arg(destination);
        } else {
            command
                .arg("-e")
                .arg(self.shell.ssh_command_line(&self.destination, Some(conn)))
                .arg(source)
                .arg(format!("{}:{}", self.destination.host, destination.display()));
        }
        run_command(command)
    }

    fn link_and_chown(
        &self,
        conn: &ConnectionId,
        target: &Path,
        link: &Path,
        owner: &OwnerGroup,
        also_chown: &[PathBuf],
    ) -> Result<(), TransportError> {
        let mut script = format!(
            "/bin/ln -sfn {} {} && /bin/chown -h {} {}",
            quote_path(target),
            quote_path(link),
            shell_quote(&owner.to_string()),
            quote_path(link),
        );
        for path in also_chown {
            script.push(' ');
            script.push_str(&quote_path(path));
        }
        self.run(conn, &script)
    }

    fn probe_writable(
        &self,
        conn: &ConnectionId,
        dir: &Path,
        owner: &OwnerGroup,
    ) -> Result<(), TransportError> {
        let probe = quote_path(&dir.join(format!(".xrd-janitor-probe-{}", conn.run_id)));
        let script = format!(
            "/bin/touch {probe} && /bin/chown {} {probe} && /bin/rm -f {probe}",
            shell_quote(&owner.to_string()),
        );
        self.run(conn, &script)
    }

    fn close(&self, conn: &ConnectionId) {
        self.shell.close(&self.destination, conn);
    }
}

/// Names from `names` that have a running process on this host, per `pgrep -x`.
pub fn running_daemons(names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|name| {
            Command::new("pgrep")
                .arg("-x")
                .arg(name.as_str())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/ns/plain"), "'/ns/plain'");
        assert_eq!(shell_quote("/ns/it's"), r"'/ns/it'\''s'");
    }

    #[test]
    fn test_ssh_command_line_uses_worker_socket() {
        let shell = RemoteShell::from_config(&AppConfig::default());
        let host = Host::parse("alice@se1:2222", "root", 22).unwrap();
        let conn = ConnectionId::new("run", 3);
        let line = shell.ssh_command_line(&host, Some(&conn));
        assert!(line.starts_with("/usr/bin/ssh -o ControlMaster=auto"));
        assert!(line.contains("ControlPath=/dev/shm/.xrd-janitor-run-0003.socket"));
        assert!(line.ends_with("-p 2222 -l alice"));
    }

    #[test]
    fn test_local_command_runs_through_sh() {
        let shell = RemoteShell::from_config(&AppConfig::default());
        let host = Host::parse("localhost", "root", 22).unwrap();
        let command = shell.command(&host, None, "true");
        assert_eq!(command.get_program(), "/bin/sh");
        assert!(shell.run(&host, None, "true").is_ok());
        assert!(matches!(
            shell.run(&host, None, "exit 3"),
            Err(TransportError::Failed { code: Some(3), .. })
        ));
    }
}
