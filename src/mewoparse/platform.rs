//! Facts about the machine the Mewofile runs on.
//!
//! Conditional attributes (`#linux`, `#arch(arm64)`, `#env(CI)`, ...) consult
//! a [`Platform`] instead of the process environment directly, so tests can
//! describe any host.

use std::env;
use std::fs;
use std::path::Path;

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Linux,
    MacOs,
    Other,
}

impl OsFamily {
    /// Family of the running build.
    pub fn current() -> Self {
        if cfg!(windows) {
            OsFamily::Windows
        } else if cfg!(target_os = "linux") {
            OsFamily::Linux
        } else if cfg!(target_os = "macos") {
            OsFamily::MacOs
        } else {
            OsFamily::Other
        }
    }

    pub fn is_unix(self) -> bool {
        matches!(self, OsFamily::Linux | OsFamily::MacOs)
    }
}

/// Platform queries used by conditionals and `${#env(...)}`.
pub trait Platform {
    fn os(&self) -> OsFamily;

    /// One of `x86_64`, `arm64`, `x86`, `arm`, `riscv`, `unknown`.
    fn arch(&self) -> String;

    /// Linux distribution id (`ID=` in `/etc/os-release`), `unknown` when it
    /// cannot be read, `none` off Linux.
    fn distro(&self) -> String;

    fn env_var(&self, name: &str) -> Option<String>;

    fn path_exists(&self, path: &str) -> bool;
}

impl<T: Platform + ?Sized> Platform for &T {
    fn os(&self) -> OsFamily {
        (**self).os()
    }

    fn arch(&self) -> String {
        (**self).arch()
    }

    fn distro(&self) -> String {
        (**self).distro()
    }

    fn env_var(&self, name: &str) -> Option<String> {
        (**self).env_var(name)
    }

    fn path_exists(&self, path: &str) -> bool {
        (**self).path_exists(path)
    }
}

/// The machine this process runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostPlatform;

impl Platform for HostPlatform {
    fn os(&self) -> OsFamily {
        OsFamily::current()
    }

    fn arch(&self) -> String {
        normalize_arch(env::consts::ARCH).to_string()
    }

    fn distro(&self) -> String {
        if OsFamily::current() != OsFamily::Linux {
            return "none".to_string();
        }
        fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| parse_os_release_id(&content))
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn env_var(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }

    fn path_exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }
}

/// Maps Rust's architecture names onto the names Mewofiles use.
pub fn normalize_arch(arch: &str) -> &'static str {
    match arch {
        "x86_64" => "x86_64",
        "aarch64" => "arm64",
        "x86" => "x86",
        "arm" => "arm",
        "riscv32" | "riscv64" => "riscv",
        _ => "unknown",
    }
}

/// Extracts the `ID=` value from os-release content.
pub fn parse_os_release_id(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("ID="))
        .map(|id| id.trim().trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_arch() {
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("riscv64"), "riscv");
        assert_eq!(normalize_arch("powerpc"), "unknown");
    }

    #[test]
    fn test_parse_os_release_id() {
        let content = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nID_LIKE=debian\n";
        assert_eq!(parse_os_release_id(content), Some("ubuntu".to_string()));
        assert_eq!(parse_os_release_id("ID=\"fedora\"\n"), Some("fedora".to_string()));
        assert_eq!(parse_os_release_id("NAME=x\n"), None);
    }

    #[test]
    fn test_exactly_one_platform_family() {
        let os = HostPlatform.os();
        let hits = [OsFamily::Windows, OsFamily::Linux, OsFamily::MacOs]
            .iter()
            .filter(|family| **family == os)
            .count();
        assert!(hits <= 1);
        assert_eq!(os.is_unix(), matches!(os, OsFamily::Linux | OsFamily::MacOs));
    }
}
