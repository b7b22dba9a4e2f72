//! Kernel IP forwarding control via a sysctl declaration file
//!
//! The declaration file is the single persisted format: it exists exactly
//! when forwarding is enabled and is rewritten wholesale on every pass, so
//! repeated toggles never duplicate lines and never touch unrelated sysctl
//! configuration.

use crate::cmd;
use crate::model::HostPaths;
use crate::Result;
use log::{debug, error, info};
use std::fs;
use std::io::ErrorKind;

/// Contents of the declaration file when forwarding is enabled
pub const SYSCTL_DECLARATION: &str = "net.ipv4.ip_forward=1\nnet.ipv6.conf.all.forwarding=1\n";

/// Capability to reload sysctl settings system-wide
pub trait SysctlApplier {
    fn apply_system(&self) -> Result<()>;
}

/// Applier backed by the `sysctl` binary
#[derive(Debug, Clone, Copy, Default)]
pub struct SysctlCli;

impl SysctlApplier for SysctlCli {
    fn apply_system(&self) -> Result<()> {
        let output = cmd::run("sysctl", &["--system"])?;
        if !output.success() {
            return Err(cmd::failure("sysctl --system", &output));
        }
        Ok(())
    }
}

/// Bring the declaration file in line with `forward_ip`, then reload.
///
/// A reload failure is logged with the failing command and does not abort
/// the pass: the declaration is persisted, the kernel state catches up on
/// the next reload or reboot.
pub fn configure_forwarding(
    paths: &HostPaths,
    applier: &dyn SysctlApplier,
    forward_ip: bool,
) -> Result<()> {
    if forward_ip {
        if let Some(parent) = paths.sysctl_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&paths.sysctl_file, SYSCTL_DECLARATION)?;
        info!(
            "wrote forwarding declaration to {}",
            paths.sysctl_file.display()
        );
    } else {
        match fs::remove_file(&paths.sysctl_file) {
            Ok(()) => info!(
                "removed forwarding declaration {}",
                paths.sysctl_file.display()
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("forwarding declaration already absent")
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Err(e) = applier.apply_system() {
        error!("failed to reload sysctl settings: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::cell::RefCell;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeSysctl {
        applied: RefCell<u32>,
        fail: bool,
    }

    impl SysctlApplier for FakeSysctl {
        fn apply_system(&self) -> Result<()> {
            *self.applied.borrow_mut() += 1;
            if self.fail {
                Err(Error::Command {
                    cmd: "sysctl --system".to_string(),
                    message: "permission denied".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn fixture() -> (tempfile::TempDir, HostPaths) {
        let dir = tempdir().unwrap();
        let paths = HostPaths::rooted(dir.path());
        (dir, paths)
    }

    #[test]
    fn test_enable_writes_declaration() {
        let (_dir, paths) = fixture();
        let sysctl = FakeSysctl::default();

        configure_forwarding(&paths, &sysctl, true).unwrap();

        let contents = fs::read_to_string(&paths.sysctl_file).unwrap();
        assert!(contents.contains("net.ipv4.ip_forward=1"));
        assert!(contents.contains("net.ipv6.conf.all.forwarding=1"));
        assert_eq!(*sysctl.applied.borrow(), 1);
    }

    #[test]
    fn test_enable_twice_does_not_duplicate() {
        let (_dir, paths) = fixture();
        let sysctl = FakeSysctl::default();

        configure_forwarding(&paths, &sysctl, true).unwrap();
        configure_forwarding(&paths, &sysctl, true).unwrap();

        let contents = fs::read_to_string(&paths.sysctl_file).unwrap();
        assert_eq!(contents.matches("net.ipv4.ip_forward").count(), 1);
        assert_eq!(contents.matches("net.ipv6.conf.all.forwarding").count(), 1);
    }

    #[test]
    fn test_disable_removes_declaration() {
        let (_dir, paths) = fixture();
        let sysctl = FakeSysctl::default();

        configure_forwarding(&paths, &sysctl, true).unwrap();
        configure_forwarding(&paths, &sysctl, false).unwrap();
        assert!(!paths.sysctl_file.exists());
    }

    #[test]
    fn test_disable_tolerates_absent_file() {
        let (_dir, paths) = fixture();
        let sysctl = FakeSysctl::default();

        configure_forwarding(&paths, &sysctl, false).unwrap();
        configure_forwarding(&paths, &sysctl, false).unwrap();
        assert!(!paths.sysctl_file.exists());
        assert_eq!(*sysctl.applied.borrow(), 2);
    }

    #[test]
    fn test_reload_failure_is_not_fatal() {
        let (_dir, paths) = fixture();
        let sysctl = FakeSysctl {
            fail: true,
            ..FakeSysctl::default()
        };

        configure_forwarding(&paths, &sysctl, true).unwrap();
        // Declaration persisted even though the reload failed.
        assert!(paths.sysctl_file.exists());
    }
}
