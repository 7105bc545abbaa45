//! Package provider backed by `dnf`/`rpm` or `apt-get`/`dpkg-query`

use anyhow::{Result, bail};

use super::{Provider, run_checked};
use crate::context::{ApplyContext, PackageManager};
use crate::resource::{Action, PackageSpec};
use crate::types::{ApplyResult, ResourceState};

impl PackageSpec {
    /// Installed version, `None` when not installed
    fn installed_version(&self, package: &str, ctx: &ApplyContext) -> Result<Option<String>> {
        let name = self.qualified(package, ctx.package_manager);
        let output = match ctx.package_manager {
            PackageManager::Dnf => ctx
                .runner
                .run("rpm", &["-q", "--queryformat", "%{VERSION}-%{RELEASE}", &name])?,
            PackageManager::Apt => ctx
                .runner
                .run("dpkg-query", &["-W", "-f=${Version}", &name])?,
        };
        if !output.success() {
            return Ok(None);
        }
        Ok(Some(output.stdout_str().trim().to_string()))
    }

    fn qualified(&self, package: &str, manager: PackageManager) -> String {
        match (&self.arch, manager) {
            (Some(arch), PackageManager::Dnf) => format!("{package}.{arch}"),
            (Some(arch), PackageManager::Apt) => format!("{package}:{arch}"),
            (None, _) => package.to_string(),
        }
    }

    fn install_spec(&self, package: &str, manager: PackageManager) -> String {
        let name = self.qualified(package, manager);
        match (&self.version, manager) {
            (Some(version), PackageManager::Dnf) => format!("{name}-{version}"),
            (Some(version), PackageManager::Apt) => format!("{name}={version}"),
            (None, _) => name,
        }
    }

    /// Packages that are missing or at the wrong pinned version
    fn needing_install(&self, ctx: &ApplyContext) -> Result<Vec<&str>> {
        let mut needed = Vec::new();
        for package in &self.packages {
            let wanted = match self.installed_version(package, ctx)? {
                None => true,
                Some(installed) => self
                    .version
                    .as_deref()
                    .is_some_and(|v| !installed.starts_with(v)),
            };
            if wanted {
                needed.push(package.as_str());
            }
        }
        Ok(needed)
    }

    fn installed(&self, ctx: &ApplyContext) -> Result<Vec<&str>> {
        let mut installed = Vec::new();
        for package in &self.packages {
            if self.installed_version(package, ctx)?.is_some() {
                installed.push(package.as_str());
            }
        }
        Ok(installed)
    }

    fn upgradable(&self, ctx: &ApplyContext) -> Result<bool> {
        let names: Vec<String> = self
            .packages
            .iter()
            .map(|p| self.qualified(p, ctx.package_manager))
            .collect();
        let mut args: Vec<&str> = Vec::new();
        match ctx.package_manager {
            PackageManager::Dnf => {
                args.extend(["-q", "check-update"]);
                args.extend(names.iter().map(String::as_str));
                // check-update exits 100 when updates are available
                Ok(ctx.runner.run("dnf", &args)?.code == Some(100))
            }
            PackageManager::Apt => {
                args.extend(["-s", "install", "--only-upgrade"]);
                args.extend(names.iter().map(String::as_str));
                let output = ctx.runner.run("apt-get", &args)?;
                Ok(output.stdout_str().lines().any(|l| l.starts_with("Inst ")))
            }
        }
    }

    fn install(&self, packages: &[&str], ctx: &ApplyContext) -> Result<()> {
        let manager = ctx.package_manager;
        let targets: Vec<String> = match &self.source {
            Some(source) => vec![source.display().to_string()],
            None => packages
                .iter()
                .map(|p| self.install_spec(p, manager))
                .collect(),
        };
        let mut args: Vec<&str> = match (manager, self.source.is_some()) {
            (PackageManager::Dnf, _) => vec!["-y", "install"],
            (PackageManager::Apt, false) => vec!["-y", "install"],
            (PackageManager::Apt, true) => vec!["-i"],
        };
        args.extend(targets.iter().map(String::as_str));
        let cmd = match (manager, self.source.is_some()) {
            (PackageManager::Dnf, _) => "dnf",
            (PackageManager::Apt, false) => "apt-get",
            (PackageManager::Apt, true) => "dpkg",
        };
        log::debug!("Installing {}", targets.join(" "));
        run_checked(ctx, cmd, &args)
    }

    fn upgrade(&self, ctx: &ApplyContext) -> Result<()> {
        let names: Vec<String> = self
            .packages
            .iter()
            .map(|p| self.qualified(p, ctx.package_manager))
            .collect();
        let (cmd, mut args) = match ctx.package_manager {
            PackageManager::Dnf => ("dnf", vec!["-y", "upgrade"]),
            PackageManager::Apt => ("apt-get", vec!["-y", "install", "--only-upgrade"]),
        };
        args.extend(names.iter().map(String::as_str));
        run_checked(ctx, cmd, &args)
    }

    fn remove(&self, packages: &[&str], ctx: &ApplyContext) -> Result<()> {
        let names: Vec<String> = packages
            .iter()
            .map(|p| self.qualified(p, ctx.package_manager))
            .collect();
        let (cmd, mut args) = match ctx.package_manager {
            PackageManager::Dnf => ("dnf", vec!["-y", "remove"]),
            PackageManager::Apt => ("apt-get", vec!["-y", "remove"]),
        };
        args.extend(names.iter().map(String::as_str));
        run_checked(ctx, cmd, &args)
    }
}

impl Provider for PackageSpec {
    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let missing = self.needing_install(ctx)?;
        if missing.is_empty() {
            Ok(ResourceState::Present { details: None })
        } else if missing.len() == self.packages.len() {
            Ok(ResourceState::Absent)
        } else {
            Ok(ResourceState::Modified {
                from: format!("missing {}", missing.join(", ")),
                to: "installed".to_string(),
            })
        }
    }

    fn apply(&self, action: Action, ctx: &ApplyContext) -> Result<ApplyResult> {
        match action {
            Action::Nothing => Ok(ApplyResult::NoChange),
            Action::Install => {
                let missing = self.needing_install(ctx)?;
                if missing.is_empty() {
                    return Ok(ApplyResult::NoChange);
                }
                if !ctx.why_run {
                    self.install(&missing, ctx)?;
                }
                Ok(ApplyResult::Created)
            }
            Action::Upgrade => {
                let missing = self.needing_install(ctx)?;
                if !missing.is_empty() {
                    if !ctx.why_run {
                        self.install(&missing, ctx)?;
                    }
                    return Ok(ApplyResult::Created);
                }
                if !self.upgradable(ctx)? {
                    return Ok(ApplyResult::NoChange);
                }
                if !ctx.why_run {
                    self.upgrade(ctx)?;
                }
                Ok(ApplyResult::Modified)
            }
            Action::Remove => {
                let installed = self.installed(ctx)?;
                if installed.is_empty() {
                    return Ok(ApplyResult::NoChange);
                }
                if !ctx.why_run {
                    self.remove(&installed, ctx)?;
                }
                Ok(ApplyResult::Removed)
            }
            other => bail!("package does not support action {other}"),
        }
    }
}
