//! Host fact discovery

use anyhow::Result;
use declarative::Facts;
use std::fs;
use std::path::Path;

const OS_RELEASE: &str = "/etc/os-release";

/// Gather facts about the machine fleetctl runs on
pub fn gather() -> Result<Facts> {
    let hostname = nix::unistd::gethostname()?
        .to_string_lossy()
        .to_string();
    let os_release = fs::read_to_string(OS_RELEASE).unwrap_or_else(|e| {
        log::warn!("Could not read {OS_RELEASE}: {e}");
        String::new()
    });

    let facts = Facts {
        fqdn: fqdn(&hostname),
        hostname: short_name(&hostname).to_string(),
        systemd: Path::new("/run/systemd/system").is_dir(),
        container: in_container(),
        ..Facts::default()
    }
    .with_os_release(&os_release);

    log::debug!(
        "Host {} is {} {} ({})",
        facts.fqdn,
        facts.platform,
        facts.platform_version,
        facts.platform_family
    );
    Ok(facts)
}

fn short_name(hostname: &str) -> &str {
    hostname.split('.').next().unwrap_or(hostname)
}

fn fqdn(hostname: &str) -> String {
    if hostname.contains('.') {
        return hostname.to_string();
    }
    fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|name| name.contains('.'))
        .unwrap_or_else(|| hostname.to_string())
}

fn in_container() -> bool {
    std::env::var_os("container").is_some()
        || Path::new("/.dockerenv").exists()
        || Path::new("/run/.containerenv").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("scale-web1.socallinuxexpo.org"), "scale-web1");
        assert_eq!(short_name("scale-web1"), "scale-web1");
    }

    #[test]
    fn test_fqdn_kept_when_qualified() {
        assert_eq!(fqdn("scale-db1.socallinuxexpo.org"), "scale-db1.socallinuxexpo.org");
    }

    #[test]
    fn test_gather_reports_hostname() {
        let facts = gather().unwrap();
        assert!(!facts.hostname.is_empty());
        assert!(!facts.hostname.contains('.'));
    }
}
