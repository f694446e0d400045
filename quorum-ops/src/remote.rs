use std::{env, path::Path, process::Output};

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::{Error, Result};

/// Copy and execute primitives used to reach a node.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Copies a local file into "remote_path" on the host.
    async fn copy(&self, local_path: &Path, host: &str, remote_path: &str) -> Result<()>;

    /// Runs the command on the host and returns its stdout.
    async fn execute(&self, host: &str, cmd: &str) -> Result<String>;
}

/// Reaches nodes with "ssh" and "scp", authenticated by one operator key.
/// Host-key verification is disabled.
#[derive(Debug, Clone)]
pub struct Ssh {
    pub key_path: String,
    pub user: String,
}

impl Ssh {
    pub fn new(key_path: &str, user: &str) -> Self {
        Self {
            key_path: key_path.to_string(),
            user: user.to_string(),
        }
    }

    /// Loads the private key path from the environment variable.
    /// Fails before any remote call if the variable is unset or empty.
    pub fn from_env(key_env: &str, user: &str) -> Result<Self> {
        let key_path = env::var(key_env).unwrap_or_default();
        if key_path.trim().is_empty() {
            return Err(Error::Config {
                message: format!("no SSH key set in ${}", key_env),
            });
        }
        Ok(Self::new(key_path.trim(), user))
    }

    fn auth_args(&self) -> [&str; 4] {
        ["-i", &self.key_path, "-o", "StrictHostKeyChecking=no"]
    }

    fn target(&self, host: &str) -> String {
        format!("{}@{}", self.user, host)
    }
}

#[async_trait]
impl Transport for Ssh {
    async fn copy(&self, local_path: &Path, host: &str, remote_path: &str) -> Result<()> {
        let dest = format!("{}:{}", self.target(host), remote_path);
        log::debug!("scp {} {}", local_path.display(), dest);

        let out = Command::new("scp")
            .args(self.auth_args())
            .arg(local_path)
            .arg(&dest)
            .output()
            .await
            .map_err(|e| Error::Remote {
                message: format!("failed to spawn scp to {}: {}", dest, e),
            })?;
        check_output("scp", host, out).map(|_| ())
    }

    async fn execute(&self, host: &str, cmd: &str) -> Result<String> {
        log::debug!("ssh {} '{}'", self.target(host), cmd);

        let out = Command::new("ssh")
            .args(self.auth_args())
            .arg(self.target(host))
            .arg(cmd)
            .output()
            .await
            .map_err(|e| Error::Remote {
                message: format!("failed to spawn ssh to {}: {}", host, e),
            })?;
        check_output("ssh", host, out)
    }
}

fn check_output(program: &str, host: &str, out: Output) -> Result<String> {
    if !out.status.success() {
        return Err(Error::Remote {
            message: format!(
                "{} to {} exited with {}: {}",
                program,
                host,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

#[cfg(test)]
pub(crate) mod fake {
    use std::{
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use async_trait::async_trait;
    use tokio::time::{sleep, Duration};

    use super::Transport;
    use crate::errors::{Error, Result};

    /// Records every call; fails any call whose host or command
    /// contains one of "fail_on".
    #[derive(Default)]
    pub struct Recorder {
        pub calls: Mutex<Vec<String>>,
        pub fail_on: Vec<String>,
        pub delay_ms: u64,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl Recorder {
        pub fn failing(fail_on: &[&str]) -> Self {
            Self {
                fail_on: fail_on.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn delayed(delay_ms: u64) -> Self {
            Self {
                delay_ms,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn track(&self, call: String) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let failed = self.fail_on.iter().any(|f| call.contains(f.as_str()));
            self.calls.lock().unwrap().push(call.clone());
            if failed {
                return Err(Error::Remote {
                    message: format!("injected failure: {}", call),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn copy(&self, local_path: &Path, host: &str, remote_path: &str) -> Result<()> {
            let call = format!("copy {} {}:{}", local_path.display(), host, remote_path);
            self.track(call).await
        }

        async fn execute(&self, host: &str, cmd: &str) -> Result<String> {
            self.track(format!("execute {} {}", host, cmd)).await?;
            Ok(String::new())
        }
    }
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- remote::test_ssh_from_env --exact --show-output
#[test]
fn test_ssh_from_env() {
    let _ = env_logger::builder().is_test(true).try_init();

    let var = format!(
        "QUORUM_TEST_KEY_{}",
        random_manager::secure_string(8).to_uppercase()
    );

    let ret = Ssh::from_env(&var, "ubuntu");
    assert!(matches!(ret, Err(Error::Config { .. })));

    env::set_var(&var, "  ");
    let ret = Ssh::from_env(&var, "ubuntu");
    assert!(matches!(ret, Err(Error::Config { .. })));

    env::set_var(&var, "/home/me/.ssh/cluster.pem");
    let ssh = Ssh::from_env(&var, "ubuntu").unwrap();
    assert_eq!(ssh.key_path, "/home/me/.ssh/cluster.pem");
    assert_eq!(ssh.target("1.2.3.4"), "ubuntu@1.2.3.4");
    assert_eq!(
        ssh.auth_args(),
        ["-i", "/home/me/.ssh/cluster.pem", "-o", "StrictHostKeyChecking=no"]
    );
    env::remove_var(&var);
}
