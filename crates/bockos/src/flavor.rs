//! Console image flavors and their tooling.

use std::fmt;
use std::process::Command;

/// Userland a console container is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Busybox or Alpine style userland.
    Busybox,
    /// Debian or Ubuntu style userland.
    Debian,
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busybox => write!(f, "busybox"),
            Self::Debian => write!(f, "debian"),
        }
    }
}

/// Detect the flavor from `/etc/os-release` contents.
///
/// `ID` and `ID_LIKE` are checked for Debian derivatives; anything else,
/// including an empty file, is treated as Busybox.
#[must_use]
pub fn detect(os_release: &str) -> Flavor {
    let debian_like = os_release.lines().any(|line| {
        let Some((key, value)) = line.split_once('=') else {
            return false;
        };
        matches!(key.trim(), "ID" | "ID_LIKE")
            && value
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .split_whitespace()
                .any(|id| matches!(id, "debian" | "ubuntu"))
    });
    if debian_like { Flavor::Debian } else { Flavor::Busybox }
}

impl Flavor {
    /// Command creating `user` with `shell` as login shell.
    #[must_use]
    pub fn add_user_command(self, user: &str, shell: &str) -> Command {
        let mut command = match self {
            Self::Busybox => {
                let mut c = Command::new("adduser");
                c.args(["-D", "-s", shell, user]);
                c
            }
            Self::Debian => {
                let mut c = Command::new("useradd");
                c.args(["--create-home", "--shell", shell, user]);
                c
            }
        };
        command.env_clear().env("PATH", "/usr/sbin:/usr/bin:/sbin:/bin");
        command
    }
}

/// Command setting the kernel hostname. Both flavors ship `hostname`.
#[must_use]
pub fn hostname_command(hostname: &str) -> Command {
    let mut command = Command::new("hostname");
    command.arg(hostname);
    command
}
