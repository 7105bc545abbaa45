//! Resource declarations
//!
//! A [`Resource`] is one declared unit of desired host state. Its kind is a
//! closed set ([`ResourceType`]) and each kind carries a fixed field set
//! ([`ResourceSpec`]), validated when the resource enters a collection.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::guard::{Condition, Guards};
use crate::notify::{Notification, Timing};

/// Resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Package,
    File,
    Directory,
    Template,
    Link,
    Execute,
    Service,
    Cron,
}

impl ResourceType {
    pub const ALL: [ResourceType; 8] = [
        Self::Package,
        Self::File,
        Self::Directory,
        Self::Template,
        Self::Link,
        Self::Execute,
        Self::Service,
        Self::Cron,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::File => "file",
            Self::Directory => "directory",
            Self::Template => "template",
            Self::Link => "link",
            Self::Execute => "execute",
            Self::Service => "service",
            Self::Cron => "cron",
        }
    }

    /// Actions this kind implements (`nothing` is always allowed)
    pub fn supported_actions(&self) -> &'static [Action] {
        use Action::*;
        match self {
            Self::Package => &[Nothing, Install, Upgrade, Remove],
            Self::File | Self::Template => &[Nothing, Create, CreateIfMissing, Delete, Touch],
            Self::Directory | Self::Link | Self::Cron => &[Nothing, Create, Delete],
            Self::Execute => &[Nothing, Run],
            Self::Service => &[Nothing, Enable, Disable, Start, Stop, Restart, Reload],
        }
    }

    /// Actions taken when a declaration names none
    pub fn default_actions(&self) -> Vec<Action> {
        match self {
            Self::Package => vec![Action::Install],
            Self::Execute => vec![Action::Run],
            Self::Service => vec![Action::Enable, Action::Start],
            _ => vec![Action::Create],
        }
    }

    pub fn supports(&self, action: Action) -> bool {
        self.supported_actions().contains(&action)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidReference(s.to_string()))
    }
}

/// An action a provider can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Nothing,
    Install,
    Upgrade,
    Remove,
    Create,
    CreateIfMissing,
    Delete,
    Touch,
    Run,
    Enable,
    Disable,
    Start,
    Stop,
    Restart,
    Reload,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Remove => "remove",
            Self::Create => "create",
            Self::CreateIfMissing => "create_if_missing",
            Self::Delete => "delete",
            Self::Touch => "touch",
            Self::Run => "run",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reload => "reload",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a resource within a collection: `type[name]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub kind: ResourceType,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidReference(s.to_string());
        let (kind, rest) = s.split_once('[').ok_or_else(invalid)?;
        let name = rest.strip_suffix(']').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        let kind = kind.parse().map_err(|_| invalid())?;
        Ok(Self::new(kind, name))
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceKey {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Ownership and mode shared by file-like kinds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    /// Octal string, e.g. `"0644"`
    #[serde(default)]
    pub mode: Option<String>,
}

impl Permissions {
    pub fn new(owner: &str, group: &str, mode: &str) -> Self {
        Self {
            owner: Some(owner.to_string()),
            group: Some(group.to_string()),
            mode: Some(mode.to_string()),
        }
    }

    /// Parsed mode bits
    pub fn mode_bits(&self) -> Option<u32> {
        self.mode
            .as_deref()
            .and_then(|m| u32::from_str_radix(m, 8).ok())
    }

    fn validate(&self, key: &ResourceKey) -> Result<()> {
        if let Some(mode) = &self.mode
            && !mode_pattern().is_match(mode)
        {
            return Err(Error::invalid(key, format!("invalid mode '{mode}'")));
        }
        for name in [&self.owner, &self.group].into_iter().flatten() {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(Error::invalid(key, format!("invalid owner/group '{name}'")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub packages: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Local package file to install from
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub arch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: PathBuf,
    /// Managed content; `None` manages existence and permissions only
    #[serde(default)]
    pub content: Option<String>,
    #[serde(flatten)]
    pub perms: Permissions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySpec {
    pub path: PathBuf,
    #[serde(flatten)]
    pub perms: Permissions,
    #[serde(default)]
    pub recursive: bool,
}

/// A file whose content was rendered from a template when the run compiled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub path: PathBuf,
    /// Where the template came from, for reporting
    pub source: String,
    pub content: String,
    #[serde(flatten)]
    pub perms: Permissions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub path: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSpec {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Skip the command when this path exists
    #[serde(default)]
    pub creates: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub service_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSpec {
    /// Five cron fields or an `@` shortcut
    pub time: String,
    #[serde(default = "default_cron_user")]
    pub user: String,
    pub command: String,
    #[serde(default = "default_cron_dir")]
    pub cron_dir: PathBuf,
}

fn default_cron_user() -> String {
    "root".to_string()
}

fn default_cron_dir() -> PathBuf {
    PathBuf::from("/etc/cron.d")
}

/// Fixed field set per resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    Package(PackageSpec),
    File(FileSpec),
    Directory(DirectorySpec),
    Template(TemplateSpec),
    Link(LinkSpec),
    Execute(ExecuteSpec),
    Service(ServiceSpec),
    Cron(CronSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceType {
        match self {
            Self::Package(_) => ResourceType::Package,
            Self::File(_) => ResourceType::File,
            Self::Directory(_) => ResourceType::Directory,
            Self::Template(_) => ResourceType::Template,
            Self::Link(_) => ResourceType::Link,
            Self::Execute(_) => ResourceType::Execute,
            Self::Service(_) => ResourceType::Service,
            Self::Cron(_) => ResourceType::Cron,
        }
    }

    fn validate(&self, key: &ResourceKey) -> Result<()> {
        match self {
            Self::Package(spec) => {
                if spec.packages.is_empty() {
                    return Err(Error::invalid(key, "no packages listed"));
                }
                if let Some(bad) = spec
                    .packages
                    .iter()
                    .find(|p| p.is_empty() || p.contains(char::is_whitespace))
                {
                    return Err(Error::invalid(key, format!("invalid package name '{bad}'")));
                }
                if spec.source.is_some() && spec.packages.len() > 1 {
                    return Err(Error::invalid(key, "source requires a single package"));
                }
                Ok(())
            }
            Self::File(spec) => {
                require_absolute(key, &spec.path)?;
                spec.perms.validate(key)
            }
            Self::Directory(spec) => {
                require_absolute(key, &spec.path)?;
                spec.perms.validate(key)
            }
            Self::Template(spec) => {
                require_absolute(key, &spec.path)?;
                spec.perms.validate(key)
            }
            Self::Link(spec) => {
                require_absolute(key, &spec.path)?;
                if spec.to.as_os_str().is_empty() {
                    return Err(Error::invalid(key, "link target is empty"));
                }
                Ok(())
            }
            Self::Execute(spec) => {
                if spec.command.trim().is_empty() {
                    return Err(Error::invalid(key, "command is empty"));
                }
                Ok(())
            }
            Self::Service(spec) => {
                if spec.service_name.is_empty() {
                    return Err(Error::invalid(key, "service name is empty"));
                }
                Ok(())
            }
            Self::Cron(spec) => {
                require_absolute(key, &spec.cron_dir)?;
                validate_cron_time(key, &spec.time)?;
                if spec.command.trim().is_empty() {
                    return Err(Error::invalid(key, "command is empty"));
                }
                Ok(())
            }
        }
    }
}

fn require_absolute(key: &ResourceKey, path: &Path) -> Result<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(Error::invalid(
            key,
            format!("path must be absolute: {}", path.display()),
        ))
    }
}

fn mode_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0?[0-7]{3}$|^[0-7]{4}$").expect("valid mode regex"))
}

fn cron_field_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-Za-z*/,\-]+$").expect("valid cron regex"))
}

const CRON_SHORTCUTS: &[&str] = &[
    "@reboot", "@yearly", "@annually", "@monthly", "@weekly", "@daily", "@hourly",
];

fn validate_cron_time(key: &ResourceKey, time: &str) -> Result<()> {
    if CRON_SHORTCUTS.contains(&time.trim()) {
        return Ok(());
    }
    let fields: Vec<&str> = time.split_whitespace().collect();
    if fields.len() != 5 || !fields.iter().all(|f| cron_field_pattern().is_match(f)) {
        return Err(Error::invalid(key, format!("invalid cron time '{time}'")));
    }
    Ok(())
}

/// One declared resource with its actions, guards, and notifications
#[derive(Debug, Clone)]
pub struct Resource {
    pub name: String,
    pub spec: ResourceSpec,
    pub actions: Vec<Action>,
    pub guards: Guards,
    pub notifies: Vec<Notification>,
    /// Inverse notifications: run `action` on self when `target` converges
    pub subscribes: Vec<Notification>,
    /// Record failures without aborting the run
    pub ignore_failure: bool,
    /// Recipe that declared this resource
    pub declared_in: Option<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, spec: ResourceSpec) -> Self {
        let actions = spec.kind().default_actions();
        Self {
            name: name.into(),
            spec,
            actions,
            guards: Guards::default(),
            notifies: Vec::new(),
            subscribes: Vec::new(),
            ignore_failure: false,
            declared_in: None,
        }
    }

    pub fn package(name: &str) -> Self {
        Self::new(
            name,
            ResourceSpec::Package(PackageSpec {
                packages: vec![name.to_string()],
                version: None,
                source: None,
                arch: None,
            }),
        )
    }

    pub fn packages(name: &str, packages: &[&str]) -> Self {
        Self::new(
            name,
            ResourceSpec::Package(PackageSpec {
                packages: packages.iter().map(|p| p.to_string()).collect(),
                version: None,
                source: None,
                arch: None,
            }),
        )
    }

    pub fn file(path: impl AsRef<Path>, content: Option<&str>) -> Self {
        let path = path.as_ref();
        Self::new(
            path.to_string_lossy(),
            ResourceSpec::File(FileSpec {
                path: path.to_path_buf(),
                content: content.map(str::to_string),
                perms: Permissions::default(),
            }),
        )
    }

    pub fn directory(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::new(
            path.to_string_lossy(),
            ResourceSpec::Directory(DirectorySpec {
                path: path.to_path_buf(),
                perms: Permissions::default(),
                recursive: false,
            }),
        )
    }

    pub fn template(path: impl AsRef<Path>, source: &str, content: String) -> Self {
        let path = path.as_ref();
        Self::new(
            path.to_string_lossy(),
            ResourceSpec::Template(TemplateSpec {
                path: path.to_path_buf(),
                source: source.to_string(),
                content,
                perms: Permissions::default(),
            }),
        )
    }

    pub fn link(path: impl AsRef<Path>, to: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::new(
            path.to_string_lossy(),
            ResourceSpec::Link(LinkSpec {
                path: path.to_path_buf(),
                to: to.as_ref().to_path_buf(),
            }),
        )
    }

    pub fn execute(name: &str, command: &str) -> Self {
        Self::new(
            name,
            ResourceSpec::Execute(ExecuteSpec {
                command: command.to_string(),
                cwd: None,
                environment: BTreeMap::new(),
                creates: None,
            }),
        )
    }

    pub fn service(name: &str) -> Self {
        Self::new(
            name,
            ResourceSpec::Service(ServiceSpec {
                service_name: name.to_string(),
            }),
        )
    }

    pub fn cron(name: &str, time: &str, command: &str) -> Self {
        Self::new(
            name,
            ResourceSpec::Cron(CronSpec {
                time: time.to_string(),
                user: default_cron_user(),
                command: command.to_string(),
                cron_dir: default_cron_dir(),
            }),
        )
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.spec.kind(), self.name.clone())
    }

    pub fn kind(&self) -> ResourceType {
        self.spec.kind()
    }

    /// Replace the action list with a single action
    pub fn action(mut self, action: Action) -> Self {
        self.actions = vec![action];
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn only_if(mut self, condition: Condition) -> Self {
        self.guards.only_if.push(condition);
        self
    }

    pub fn not_if(mut self, condition: Condition) -> Self {
        self.guards.not_if.push(condition);
        self
    }

    pub fn notifies(mut self, action: Action, target: ResourceKey, timing: Timing) -> Self {
        self.notifies.push(Notification::new(action, target, timing));
        self
    }

    pub fn subscribes(mut self, action: Action, source: ResourceKey, timing: Timing) -> Self {
        self.subscribes.push(Notification::new(action, source, timing));
        self
    }

    pub fn ignore_failure(mut self, ignore: bool) -> Self {
        self.ignore_failure = ignore;
        self
    }

    pub fn with_perms(mut self, perms: Permissions) -> Self {
        match &mut self.spec {
            ResourceSpec::File(s) => s.perms = perms,
            ResourceSpec::Directory(s) => s.perms = perms,
            ResourceSpec::Template(s) => s.perms = perms,
            _ => {}
        }
        self
    }

    /// Check field constraints and that every action is supported
    pub fn validate(&self) -> Result<()> {
        let key = self.key();
        if self.name.is_empty() {
            return Err(Error::invalid(&key, "name is empty"));
        }
        if self.actions.is_empty() {
            return Err(Error::invalid(&key, "no actions"));
        }
        for action in &self.actions {
            if !self.kind().supports(*action) {
                return Err(Error::UnsupportedAction {
                    key: key.to_string(),
                    action: action.to_string(),
                });
            }
        }
        self.spec.validate(&key)
    }

    /// Short human-readable summary
    pub fn description(&self) -> String {
        match &self.spec {
            ResourceSpec::Package(s) => format!("packages {}", s.packages.join(", ")),
            ResourceSpec::File(s) => format!("file {}", s.path.display()),
            ResourceSpec::Directory(s) => format!("directory {}", s.path.display()),
            ResourceSpec::Template(s) => {
                format!("template {} from {}", s.path.display(), s.source)
            }
            ResourceSpec::Link(s) => format!("link {} -> {}", s.path.display(), s.to.display()),
            ResourceSpec::Execute(s) => format!("execute `{}`", s.command),
            ResourceSpec::Service(s) => format!("service {}", s.service_name),
            ResourceSpec::Cron(s) => format!("cron '{}' {}", s.time, s.command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        let key: ResourceKey = "service[sshd]".parse().unwrap();
        assert_eq!(key.kind, ResourceType::Service);
        assert_eq!(key.name, "sshd");
        assert_eq!(key.to_string(), "service[sshd]");
    }

    #[test]
    fn test_key_with_brackets_in_name() {
        let key: ResourceKey = "execute[echo [x]]".parse().unwrap();
        assert_eq!(key.name, "echo [x]");
    }

    #[test]
    fn test_invalid_keys() {
        assert!("sshd".parse::<ResourceKey>().is_err());
        assert!("service[]".parse::<ResourceKey>().is_err());
        assert!("ruby_block[reexec]".parse::<ResourceKey>().is_err());
    }

    #[test]
    fn test_default_actions() {
        assert_eq!(Resource::service("sshd").actions, vec![Action::Enable, Action::Start]);
        assert_eq!(Resource::package("chef").actions, vec![Action::Install]);
        assert_eq!(Resource::directory("/etc/chef").actions, vec![Action::Create]);
    }

    #[test]
    fn test_unsupported_action_rejected() {
        let r = Resource::file("/etc/aliases", None).action(Action::Restart);
        assert!(matches!(r.validate(), Err(Error::UnsupportedAction { .. })));
    }

    #[test]
    fn test_relative_path_rejected() {
        let r = Resource::file("etc/aliases", None);
        assert!(r.validate().unwrap_err().to_string().contains("absolute"));
    }

    #[test]
    fn test_mode_validation() {
        let ok = Resource::file("/etc/chef_secrets", None)
            .with_perms(Permissions::new("root", "root", "0600"));
        assert!(ok.validate().is_ok());

        let bad = Resource::file("/etc/chef_secrets", None)
            .with_perms(Permissions::new("root", "root", "0999"));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_cron_time_validation() {
        assert!(Resource::cron("chef", "*/15 * * * *", "/usr/local/sbin/chefctl -q")
            .validate()
            .is_ok());
        assert!(Resource::cron("logs", "@daily", "true").validate().is_ok());
        assert!(Resource::cron("bad", "*/15 * *", "true").validate().is_err());
    }

    #[test]
    fn test_package_source_needs_single_package() {
        let mut r = Resource::packages("openssh", &["openssh", "openssh-server"]);
        if let ResourceSpec::Package(spec) = &mut r.spec {
            spec.source = Some(PathBuf::from("/var/chef/cache/openssh.rpm"));
        }
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_mode_bits() {
        assert_eq!(Permissions::new("root", "root", "0755").mode_bits(), Some(0o755));
        assert_eq!(Permissions::new("root", "root", "644").mode_bits(), Some(0o644));
    }
}
