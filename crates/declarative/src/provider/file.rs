//! File, template, and directory providers

use anyhow::{Context, Result, anyhow, bail};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{MetadataExt, PermissionsExt, chown};
use std::path::Path;
use std::time::SystemTime;

use super::Provider;
use crate::context::ApplyContext;
use crate::resource::{Action, DirectorySpec, FileSpec, Permissions, TemplateSpec};
use crate::types::{ApplyResult, ResourceState};

/// Hex blake3 digest of file content
pub fn digest(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Line diff between current and desired content, `-`/`+` prefixed
pub fn content_diff(current: &str, desired: &str) -> String {
    let diff = TextDiff::from_lines(current, desired);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => continue,
        };
        out.push_str(sign);
        out.push_str(change.value());
        if change.missing_newline() {
            out.push('\n');
        }
    }
    out
}

impl Provider for FileSpec {
    fn current_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        content_state(&self.path, self.content.as_deref())
    }

    fn apply(&self, action: Action, ctx: &ApplyContext) -> Result<ApplyResult> {
        converge_file(&self.path, self.content.as_deref(), &self.perms, action, ctx)
    }
}

impl Provider for TemplateSpec {
    fn current_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        content_state(&self.path, Some(&self.content))
    }

    fn apply(&self, action: Action, ctx: &ApplyContext) -> Result<ApplyResult> {
        converge_file(&self.path, Some(&self.content), &self.perms, action, ctx)
    }
}

impl Provider for DirectorySpec {
    fn current_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        match fs::symlink_metadata(&self.path) {
            Ok(meta) if meta.is_dir() => Ok(ResourceState::Present { details: None }),
            Ok(_) => Ok(ResourceState::Modified {
                from: "not a directory".to_string(),
                to: "directory".to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ResourceState::Absent),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", self.path.display())),
        }
    }

    fn apply(&self, action: Action, ctx: &ApplyContext) -> Result<ApplyResult> {
        let path = self.path.as_path();
        match action {
            Action::Nothing => Ok(ApplyResult::NoChange),
            Action::Create => {
                let mut result = ApplyResult::NoChange;
                if path.is_file() {
                    bail!("{} exists and is not a directory", path.display());
                }
                if !path.exists() {
                    if !ctx.why_run {
                        let created = if self.recursive {
                            fs::create_dir_all(path)
                        } else {
                            fs::create_dir(path)
                        };
                        created.with_context(|| {
                            format!("Failed to create directory: {}", path.display())
                        })?;
                    }
                    result = ApplyResult::Created;
                }
                if apply_permissions(path, &self.perms, ctx)? && !result.is_change() {
                    result = ApplyResult::Modified;
                }
                Ok(result)
            }
            Action::Delete => {
                if !path.exists() {
                    return Ok(ApplyResult::NoChange);
                }
                if !path.is_dir() {
                    bail!("{} is not a directory", path.display());
                }
                if !ctx.why_run {
                    let removed = if self.recursive {
                        fs::remove_dir_all(path)
                    } else {
                        fs::remove_dir(path)
                    };
                    removed.with_context(|| {
                        format!("Failed to remove directory: {}", path.display())
                    })?;
                }
                Ok(ApplyResult::Removed)
            }
            other => bail!("directory does not support action {other}"),
        }
    }
}

fn content_state(path: &Path, content: Option<&str>) -> Result<ResourceState> {
    let current = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ResourceState::Absent),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let current_digest = digest(&current);
    match content {
        Some(desired) if digest(desired.as_bytes()) != current_digest => {
            Ok(ResourceState::Modified {
                from: short(&current_digest),
                to: short(&digest(desired.as_bytes())),
            })
        }
        _ => Ok(ResourceState::Present {
            details: Some(short(&current_digest)),
        }),
    }
}

fn short(digest: &str) -> String {
    digest.chars().take(12).collect()
}

pub(super) fn converge_file(
    path: &Path,
    content: Option<&str>,
    perms: &Permissions,
    action: Action,
    ctx: &ApplyContext,
) -> Result<ApplyResult> {
    match action {
        Action::Nothing => Ok(ApplyResult::NoChange),
        Action::Delete => match fs::symlink_metadata(path) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ApplyResult::NoChange),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
            Ok(meta) if meta.is_dir() => bail!("{} is a directory", path.display()),
            Ok(_) => {
                if !ctx.why_run {
                    fs::remove_file(path)
                        .with_context(|| format!("Failed to remove {}", path.display()))?;
                }
                Ok(ApplyResult::Removed)
            }
        },
        Action::Create | Action::CreateIfMissing | Action::Touch => {
            if path.is_dir() {
                bail!("{} is a directory", path.display());
            }
            let mut result = ApplyResult::NoChange;
            if !path.exists() {
                write_content(path, content.unwrap_or_default(), ctx)?;
                result = ApplyResult::Created;
            } else if let Some(desired) = content
                && action != Action::CreateIfMissing
            {
                let current = fs::read(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                if digest(&current) != digest(desired.as_bytes()) {
                    if ctx.verbose {
                        log::info!(
                            "{}:\n{}",
                            path.display(),
                            content_diff(&String::from_utf8_lossy(&current), desired)
                        );
                    }
                    write_content(path, desired, ctx)?;
                    result = ApplyResult::Modified;
                }
            }
            if apply_permissions(path, perms, ctx)? && !result.is_change() {
                result = ApplyResult::Modified;
            }
            if action == Action::Touch {
                if !ctx.why_run {
                    touch(path)?;
                }
                if !result.is_change() {
                    result = ApplyResult::Modified;
                }
            }
            Ok(result)
        }
        other => bail!("file does not support action {other}"),
    }
}

/// Write through a sibling temp file and rename into place
fn write_content(path: &Path, content: &str, ctx: &ApplyContext) -> Result<()> {
    if ctx.why_run {
        return Ok(());
    }
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;
    if !parent.is_dir() {
        bail!("Parent directory does not exist: {}", parent.display());
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))?
        .to_string_lossy();
    let staging = parent.join(format!(".{file_name}.fleetctl-tmp"));

    fs::write(&staging, content)
        .with_context(|| format!("Failed to write {}", staging.display()))?;
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(&staging, meta.permissions())
            .with_context(|| format!("Failed to copy permissions to {}", staging.display()))?;
    }
    fs::rename(&staging, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

fn touch(path: &Path) -> Result<()> {
    fs::File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(SystemTime::now()))
        .with_context(|| format!("Failed to touch {}", path.display()))
}

/// Bring owner, group, and mode in line; `true` when anything differed
fn apply_permissions(path: &Path, perms: &Permissions, ctx: &ApplyContext) -> Result<bool> {
    if *perms == Permissions::default() {
        return Ok(false);
    }
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        // Created by this action in why-run
        Err(e) if ctx.why_run && e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    };

    let mut changed = false;
    if let Some(bits) = perms.mode_bits()
        && meta.permissions().mode() & 0o7777 != bits
    {
        changed = true;
        if !ctx.why_run {
            fs::set_permissions(path, fs::Permissions::from_mode(bits))
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }
    }

    let uid = perms.owner.as_deref().map(lookup_uid).transpose()?;
    let gid = perms.group.as_deref().map(lookup_gid).transpose()?;
    let wrong_owner = uid.is_some_and(|u| u != meta.uid());
    let wrong_group = gid.is_some_and(|g| g != meta.gid());
    if wrong_owner || wrong_group {
        changed = true;
        if !ctx.why_run {
            chown(path, uid, gid)
                .with_context(|| format!("Failed to set ownership on {}", path.display()))?;
        }
    }
    Ok(changed)
}

fn lookup_uid(name: &str) -> Result<u32> {
    if let Ok(uid) = name.parse() {
        return Ok(uid);
    }
    nix::unistd::User::from_name(name)
        .with_context(|| format!("Failed to look up user: {name}"))?
        .map(|u| u.uid.as_raw())
        .ok_or_else(|| anyhow!("Unknown user: {name}"))
}

fn lookup_gid(name: &str) -> Result<u32> {
    if let Ok(gid) = name.parse() {
        return Ok(gid);
    }
    nix::unistd::Group::from_name(name)
        .with_context(|| format!("Failed to look up group: {name}"))?
        .map(|g| g.gid.as_raw())
        .ok_or_else(|| anyhow!("Unknown group: {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Node;
    use crate::context::test_support::MockRunner;
    use tempfile::TempDir;

    fn spec(path: &Path, content: Option<&str>) -> FileSpec {
        FileSpec {
            path: path.to_path_buf(),
            content: content.map(str::to_string),
            perms: Permissions::default(),
        }
    }

    #[test]
    fn test_create_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("motd");
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        let file = spec(&path, Some("welcome\n"));

        assert_eq!(file.apply(Action::Create, &ctx).unwrap(), ApplyResult::Created);
        assert_eq!(file.apply(Action::Create, &ctx).unwrap(), ApplyResult::NoChange);
        assert_eq!(fs::read_to_string(&path).unwrap(), "welcome\n");
    }

    #[test]
    fn test_content_change_rewrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aliases");
        fs::write(&path, "old\n").unwrap();
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);

        let result = spec(&path, Some("new\n")).apply(Action::Create, &ctx).unwrap();
        assert_eq!(result, ApplyResult::Modified);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_create_if_missing_keeps_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chef_secrets");
        fs::write(&path, "local edits\n").unwrap();
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);

        let result = spec(&path, Some("{}\n"))
            .apply(Action::CreateIfMissing, &ctx)
            .unwrap();
        assert_eq!(result, ApplyResult::NoChange);
        assert_eq!(fs::read_to_string(&path).unwrap(), "local edits\n");
    }

    #[test]
    fn test_why_run_does_not_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new");
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node).why_run(true);

        let result = spec(&path, Some("x")).apply(Action::Create, &ctx).unwrap();
        assert_eq!(result, ApplyResult::Created);
        assert!(!path.exists());
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stale.yaml");
        fs::write(&path, "x").unwrap();
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        let file = spec(&path, None);

        assert_eq!(file.apply(Action::Delete, &ctx).unwrap(), ApplyResult::Removed);
        assert_eq!(file.apply(Action::Delete, &ctx).unwrap(), ApplyResult::NoChange);
    }

    #[test]
    fn test_mode_is_enforced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret");
        fs::write(&path, "s").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        let mut file = spec(&path, Some("s"));
        file.perms.mode = Some("0600".into());

        assert_eq!(file.apply(Action::Create, &ctx).unwrap(), ApplyResult::Modified);
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o600);
        assert_eq!(file.apply(Action::Create, &ctx).unwrap(), ApplyResult::NoChange);
    }

    #[test]
    fn test_numeric_owner_matching_current_owner_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("owned");
        fs::write(&path, "x").unwrap();
        let uid = fs::metadata(&path).unwrap().uid();
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        let mut file = spec(&path, Some("x"));
        file.perms.owner = Some(uid.to_string());

        assert_eq!(file.apply(Action::Create, &ctx).unwrap(), ApplyResult::NoChange);
    }

    #[test]
    fn test_directory_create_and_delete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b");
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        let spec = DirectorySpec {
            path: path.clone(),
            perms: Permissions::default(),
            recursive: true,
        };

        assert_eq!(spec.apply(Action::Create, &ctx).unwrap(), ApplyResult::Created);
        assert!(path.is_dir());
        assert_eq!(spec.apply(Action::Create, &ctx).unwrap(), ApplyResult::NoChange);
        assert_eq!(spec.apply(Action::Delete, &ctx).unwrap(), ApplyResult::Removed);
        assert!(!path.exists());
    }

    #[test]
    fn test_content_diff_marks_lines() {
        let diff = content_diff("a\nb\n", "a\nc\n");
        assert_eq!(diff, "-b\n+c\n");
    }
}
