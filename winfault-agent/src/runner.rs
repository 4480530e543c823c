//! External command execution.
//!
//! All host mutation goes through PowerShell, behind the [`CommandRunner`]
//! capability so tests can substitute a recording runner and script outputs.
//! Two shell modes exist: [`Shell::Detached`] fire-and-forgets a command line
//! (the packet engine outlives the call), [`Shell::Invoke`] wraps the batch
//! in `Invoke-Expression`, waits, and captures output.

use std::future::Future;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use winfault_shared::FaultError;

/// How a command batch is handed to PowerShell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// Spawn `powershell -Command <cmds>` without waiting for completion.
    Detached,
    /// Run `powershell -Command Invoke-Expression "<cmds>"`, wait, capture.
    Invoke,
}

pub trait CommandRunner: Send + Sync {
    /// Executes the joined command batch in the given shell mode. Returns
    /// captured stdout for [`Shell::Invoke`], an empty string otherwise.
    fn run<'a>(
        &'a self,
        cmds: &'a [String],
        shell: Shell,
    ) -> impl Future<Output = Result<String, FaultError>> + Send + 'a;
}

/// The production runner: real PowerShell on the host.
#[derive(Debug, Default, Clone)]
pub struct PowershellRunner;

impl CommandRunner for PowershellRunner {
    fn run<'a>(
        &'a self,
        cmds: &'a [String],
        shell: Shell,
    ) -> impl Future<Output = Result<String, FaultError>> + Send + 'a {
        async move {
            info!(?shell, count = cmds.len(), "running commands");
            debug!(cmds = %cmds.join("; "), "command batch");

            match shell {
                Shell::Detached => {
                    Command::new("powershell")
                        .arg("-Command")
                        .arg(cmds.join(";"))
                        .stdout(Stdio::null())
                        .stderr(Stdio::null())
                        .spawn()?;
                    Ok(String::new())
                }
                Shell::Invoke => {
                    let joined = format!("\"{}\"", cmds.join(";"));
                    let output = Command::new("powershell")
                        .arg("-Command")
                        .arg("Invoke-Expression")
                        .arg(joined)
                        .output()
                        .await?;

                    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                    if !output.status.success() {
                        let stderr = String::from_utf8_lossy(&output.stderr);
                        return Err(FaultError::QosCommandFailed {
                            message: format!(
                                "execution failed ({}): output: {}, error: {}",
                                output.status, stdout, stderr
                            ),
                        });
                    }
                    Ok(stdout)
                }
            }
        }
    }
}
