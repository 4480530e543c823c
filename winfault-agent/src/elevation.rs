//! SYSTEM-scope elevation for QoS mutations.
//!
//! Host QoS policies can only be altered reliably from the SYSTEM account,
//! regardless of how the agent process was launched. Each mutation is
//! wrapped in a one-shot scheduled task: any orphaned task of the fixed name
//! is unregistered first, then the task is registered, started, polled for
//! completion, and unregistered again.

/// Fixed name of the one-shot elevation task.
pub const ELEVATION_TASK_NAME: &str = "STEADYBIT_QOS_ELEVATION";

/// Completion poll: 20 rounds of 100 ms, roughly two seconds.
const POLL_ROUNDS: u32 = 20;
const POLL_MILLIS: u32 = 100;

/// Wraps a single PowerShell command into the scheduled-task sequence that
/// executes it as SYSTEM. The returned commands form one `Invoke` batch.
pub fn system_commands_for(command: &str) -> Vec<String> {
    vec![
        // A crashed previous run may have left the task behind.
        format!(
            "Unregister-ScheduledTask -TaskName {ELEVATION_TASK_NAME} -Confirm:`$false -ErrorAction SilentlyContinue"
        ),
        format!(
            "$taskAction = New-ScheduledTaskAction -Execute 'powershell.exe' \
             -Argument '-NoProfile -WindowStyle Hidden -Command {command}'"
        ),
        "$taskPrincipal = New-ScheduledTaskPrincipal -UserId 'SYSTEM' \
         -LogonType ServiceAccount -RunLevel Highest"
            .to_string(),
        format!(
            "Register-ScheduledTask -TaskName {ELEVATION_TASK_NAME} -Action $taskAction \
             -Principal $taskPrincipal | Out-Null"
        ),
        format!("Start-ScheduledTask -TaskName {ELEVATION_TASK_NAME}"),
        format!(
            "for ($i = 0; $i -lt {POLL_ROUNDS}; $i++) {{ \
             if ((Get-ScheduledTask -TaskName {ELEVATION_TASK_NAME}).State -ne 'Running') {{ break }}; \
             Start-Sleep -Milliseconds {POLL_MILLIS} }}"
        ),
        format!("Unregister-ScheduledTask -TaskName {ELEVATION_TASK_NAME} -Confirm:`$false"),
    ]
}
