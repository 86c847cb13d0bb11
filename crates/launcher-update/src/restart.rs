//! Restarting into a freshly installed binary.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{error, info, warn};

/// File name of the Windows trampoline script.
pub const RESTART_SCRIPT_NAME: &str = "launcher_restart.bat";

/// How the current process hands over to the new executable.
pub trait RestartStrategy: Send + Sync {
    /// Start `new_exe` in place of the current process.
    ///
    /// `true` means the handover is under way and the caller should exit.
    /// `false` means nothing was started and the old binary keeps running.
    fn schedule_restart(&self, new_exe: &Path) -> bool;
}

/// Replace the process image with the new binary. On success this never
/// returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixExec;

impl RestartStrategy for PosixExec {
    fn schedule_restart(&self, new_exe: &Path) -> bool {
        if !new_exe.exists() {
            error!(
                "Cannot restart: {} does not exist",
                new_exe.display()
            );
            return false;
        }
        exec_into(new_exe)
    }
}

#[cfg(unix)]
fn exec_into(new_exe: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::process::CommandExt;

    match std::fs::metadata(new_exe) {
        Ok(metadata) => {
            let mut permissions = metadata.permissions();
            permissions.set_mode(permissions.mode() | 0o111);
            if let Err(error) = std::fs::set_permissions(new_exe, permissions) {
                warn!("Failed to mark {} executable: {error}", new_exe.display());
            }
        }
        Err(error) => warn!("Failed to read permissions of {}: {error}", new_exe.display()),
    }

    info!("Re-executing into {}", new_exe.display());
    let error = Command::new(new_exe).arg0(argv0(new_exe)).exec();
    error!("exec into {} failed: {error}", new_exe.display());
    false
}

/// Program name the new process sees, matching a normal shell launch.
#[cfg_attr(not(unix), allow(dead_code))]
fn argv0(new_exe: &Path) -> &OsStr {
    new_exe.file_name().unwrap_or(new_exe.as_os_str())
}

#[cfg(not(unix))]
fn exec_into(new_exe: &Path) -> bool {
    error!(
        "In-place re-exec is not available on this platform ({})",
        new_exe.display()
    );
    false
}

/// Launch the new binary from a detached batch script once this process has
/// exited and released its file lock.
#[derive(Debug, Clone)]
pub struct WindowsTrampoline {
    script_dir: PathBuf,
}

impl WindowsTrampoline {
    #[must_use]
    pub fn new(script_dir: impl Into<PathBuf>) -> Self {
        Self {
            script_dir: script_dir.into(),
        }
    }

    #[must_use]
    pub fn script_path(&self) -> PathBuf {
        self.script_dir.join(RESTART_SCRIPT_NAME)
    }
}

/// Batch script that waits, starts `new_exe`, then deletes itself.
#[must_use]
pub fn trampoline_script(new_exe: &Path) -> String {
    format!(
        "@echo off\r\n\
         timeout /t 2 /nobreak > nul\r\n\
         start \"\" \"{}\"\r\n\
         del \"%~f0\"\r\n",
        new_exe.display()
    )
}

/// Detached `cmd.exe` invocation of `script`. Detaching already suppresses
/// the console window.
fn trampoline_command(script: &Path) -> Command {
    use launcher_platform::Detach;

    let mut command = Command::new("cmd.exe");
    command.arg("/c").arg(script).detach();
    command
}

impl RestartStrategy for WindowsTrampoline {
    fn schedule_restart(&self, new_exe: &Path) -> bool {
        if !new_exe.exists() {
            error!(
                "Cannot restart: {} does not exist",
                new_exe.display()
            );
            return false;
        }

        let script = self.script_path();
        if let Err(error) = std::fs::write(&script, trampoline_script(new_exe)) {
            error!(
                "Failed to write restart script {}: {error}",
                script.display()
            );
            return false;
        }

        let spawned = trampoline_command(&script).spawn();

        match spawned {
            Ok(_) => {
                info!("Restart scheduled via {}", script.display());
                true
            }
            Err(error) => {
                error!("Failed to launch restart script: {error}");
                if let Err(error) = std::fs::remove_file(&script) {
                    warn!("Failed to remove restart script {}: {error}", script.display());
                }
                false
            }
        }
    }
}

/// The strategy for the platform this binary was built for. `script_dir`
/// is only used where a trampoline script is needed.
#[must_use]
pub fn default_strategy(script_dir: impl Into<PathBuf>) -> Box<dyn RestartStrategy> {
    if cfg!(windows) {
        Box::new(WindowsTrampoline::new(script_dir))
    } else {
        Box::new(PosixExec)
    }
}
