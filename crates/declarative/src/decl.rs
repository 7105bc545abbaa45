//! Data form of resource and builder declarations
//!
//! Recipes written as data describe resources with a flat field map. The
//! declaration is turned into a typed [`Resource`] during the declaration
//! phase, once the node is frozen, so templates render against final
//! attribute values.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::attributes::{AttrPath, Node};
use crate::builders;
use crate::error::{Error, Result};
use crate::guard::Condition;
use crate::notify::Notification;
use crate::render;
use crate::resource::{Action, Permissions, Resource, ResourceSpec, ResourceType};
use crate::template;

/// Reads template files named by `source_file`
pub trait TemplateLoader {
    fn load(&self, source_file: &str) -> Result<String>;
}

impl<F> TemplateLoader for F
where
    F: Fn(&str) -> Result<String>,
{
    fn load(&self, source_file: &str) -> Result<String> {
        self(source_file)
    }
}

/// Loader for recipes that cannot reference template files
pub struct NoTemplates;

impl TemplateLoader for NoTemplates {
    fn load(&self, source_file: &str) -> Result<String> {
        Err(Error::Template(format!("no template files available for {source_file}")))
    }
}

/// One action or a list of them
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Actions {
    One(Action),
    Many(Vec<Action>),
}

impl Actions {
    pub fn into_vec(self) -> Vec<Action> {
        match self {
            Self::One(action) => vec![action],
            Self::Many(actions) => actions,
        }
    }
}

/// A resource as written in a data recipe
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDecl {
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub name: String,
    #[serde(default)]
    pub action: Option<Actions>,
    #[serde(default)]
    pub only_if: Vec<Condition>,
    #[serde(default)]
    pub not_if: Vec<Condition>,
    #[serde(default)]
    pub notifies: Vec<Notification>,
    #[serde(default)]
    pub subscribes: Vec<Notification>,
    #[serde(default)]
    pub ignore_failure: bool,
    /// Kind-specific fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// How a template's content is produced
#[derive(Debug, Clone, Deserialize)]
struct RenderFrom {
    format: RenderFormat,
    attribute: AttrPath,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RenderFormat {
    Ini,
    Yaml,
    KeyValue,
}

fn allowed_fields(kind: ResourceType) -> &'static [&'static str] {
    match kind {
        ResourceType::Package => &["packages", "version", "source", "arch"],
        ResourceType::File => &["path", "content", "owner", "group", "mode"],
        ResourceType::Directory => &["path", "owner", "group", "mode", "recursive"],
        ResourceType::Template => &[
            "path",
            "source",
            "source_file",
            "variables",
            "render",
            "owner",
            "group",
            "mode",
        ],
        ResourceType::Link => &["path", "to"],
        ResourceType::Execute => &["command", "cwd", "environment", "creates"],
        ResourceType::Service => &["service_name"],
        ResourceType::Cron => &["time", "user", "command", "cron_dir"],
    }
}

impl ResourceDecl {
    fn key_string(&self) -> String {
        format!("{}[{}]", self.kind, self.name)
    }

    /// Build the typed resource, rendering template content against `node`
    pub fn into_resource(self, node: &Node, templates: &dyn TemplateLoader) -> Result<Resource> {
        let key = self.key_string();
        let allowed = allowed_fields(self.kind);
        if let Some(unknown) = self.fields.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(Error::invalid(&key, format!("unknown field '{unknown}'")));
        }

        let mut fields = self.fields;
        match self.kind {
            ResourceType::File
            | ResourceType::Directory
            | ResourceType::Template
            | ResourceType::Link => {
                fields
                    .entry("path")
                    .or_insert_with(|| Value::String(self.name.clone()));
            }
            ResourceType::Package => {
                fields
                    .entry("packages")
                    .or_insert_with(|| Value::Array(vec![Value::String(self.name.clone())]));
            }
            ResourceType::Service => {
                fields
                    .entry("service_name")
                    .or_insert_with(|| Value::String(self.name.clone()));
            }
            ResourceType::Execute => {
                fields
                    .entry("command")
                    .or_insert_with(|| Value::String(self.name.clone()));
            }
            ResourceType::Cron => {}
        }
        if self.kind == ResourceType::Template {
            let (source, content) = template_content(&key, &mut fields, node, templates)?;
            fields.insert("source".to_string(), Value::String(source));
            fields.insert("content".to_string(), Value::String(content));
        }
        fields.insert("type".to_string(), Value::String(self.kind.to_string()));

        let spec: ResourceSpec = serde_json::from_value(Value::Object(fields))
            .map_err(|e| Error::invalid(&key, e.to_string()))?;

        let mut resource = Resource::new(self.name, spec);
        if let Some(actions) = self.action {
            resource.actions = actions.into_vec();
        }
        resource.guards.only_if = self.only_if;
        resource.guards.not_if = self.not_if;
        resource.notifies = self.notifies;
        resource.subscribes = self.subscribes;
        resource.ignore_failure = self.ignore_failure;
        Ok(resource)
    }
}

/// Remove the template inputs from `fields`; return (source label, content)
fn template_content(
    key: &str,
    fields: &mut Map<String, Value>,
    node: &Node,
    templates: &dyn TemplateLoader,
) -> Result<(String, String)> {
    let inline = fields.remove("source");
    let file = fields.remove("source_file");
    let render_from = fields.remove("render");
    let variables = match fields.remove("variables") {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(Error::invalid(key, "variables must be a table")),
    };

    match (inline, file, render_from) {
        (Some(Value::String(text)), None, None) => {
            Ok(("inline".to_string(), template::render(&text, &variables, node)?))
        }
        (None, Some(Value::String(name)), None) => {
            let text = templates.load(&name)?;
            let content = template::render(&text, &variables, node)
                .map_err(|e| Error::Template(format!("{name}: {e}")))?;
            Ok((name, content))
        }
        (None, None, Some(spec)) => {
            let spec: RenderFrom =
                serde_json::from_value(spec).map_err(|e| Error::invalid(key, e.to_string()))?;
            let value = node.get(spec.attribute.clone()).ok_or_else(|| {
                Error::invalid(key, format!("attribute {} is not set", spec.attribute))
            })?;
            let as_map = || {
                value.as_object().ok_or_else(|| {
                    Error::invalid(key, format!("attribute {} is not a map", spec.attribute))
                })
            };
            let content = match spec.format {
                RenderFormat::Ini => render::ini(as_map()?)?,
                RenderFormat::KeyValue => render::key_values(as_map()?)?,
                RenderFormat::Yaml => render::yaml(value)?,
            };
            Ok((format!("node[{}]", spec.attribute), content))
        }
        _ => Err(Error::invalid(
            key,
            "template needs exactly one of source, source_file, or render",
        )),
    }
}

/// Which builder to run
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuilderKind {
    MonitorConfigs {
        dir: PathBuf,
        attribute: AttrPath,
        #[serde(flatten)]
        perms: Permissions,
    },
    CronJobs {
        attribute: AttrPath,
        #[serde(default)]
        cron_dir: Option<PathBuf>,
    },
    AuthorizedKeys {
        dir: PathBuf,
        attribute: AttrPath,
        #[serde(flatten)]
        perms: Permissions,
    },
}

/// A builder as written in a data recipe
#[derive(Debug, Clone, Deserialize)]
pub struct BuilderDecl {
    #[serde(flatten)]
    pub kind: BuilderKind,
    /// Attached to every resource the builder produces
    #[serde(default)]
    pub notifies: Vec<Notification>,
}

impl BuilderDecl {
    /// Expand against the node; an unset attribute produces nothing
    pub fn build(&self, node: &Node) -> Result<Vec<Resource>> {
        let empty = Map::new();
        let read = |path: &AttrPath| -> Result<Map<String, Value>> {
            match node.get(path.clone()) {
                None => Ok(empty.clone()),
                Some(Value::Object(map)) => Ok(map.clone()),
                Some(_) => Err(Error::attribute(path.to_string(), "expected a map")),
            }
        };
        let mut resources = match &self.kind {
            BuilderKind::MonitorConfigs {
                dir,
                attribute,
                perms,
            } => builders::monitor_configs(dir, &read(attribute)?, perms)?,
            BuilderKind::CronJobs {
                attribute,
                cron_dir,
            } => builders::cron_jobs(&read(attribute)?, cron_dir.as_deref())?,
            BuilderKind::AuthorizedKeys {
                dir,
                attribute,
                perms,
            } => builders::authorized_keys(dir, &read(attribute)?, perms)?,
        };
        for resource in &mut resources {
            if resource.actions != [Action::Delete] {
                resource.notifies.extend(self.notifies.iter().cloned());
            }
        }
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeBuilder, Layer};
    use crate::notify::Timing;
    use serde_json::json;

    fn decl(v: Value) -> ResourceDecl {
        serde_json::from_value(v).unwrap()
    }

    fn node_with(path: &str, value: Value) -> Node {
        let mut attrs = AttributeBuilder::new();
        attrs.set(Layer::Default, &AttrPath::parse(path), value).unwrap();
        attrs.build()
    }

    #[test]
    fn test_defaults_come_from_name() {
        let r = decl(json!({"type": "service", "name": "postfix"}))
            .into_resource(&Node::default(), &NoTemplates)
            .unwrap();
        assert_eq!(r.actions, vec![Action::Enable, Action::Start]);
        let ResourceSpec::Service(spec) = &r.spec else {
            panic!("expected service");
        };
        assert_eq!(spec.service_name, "postfix");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = decl(json!({"type": "file", "name": "/etc/motd", "contents": "typo"}))
            .into_resource(&Node::default(), &NoTemplates)
            .unwrap_err();
        assert!(err.to_string().contains("unknown field 'contents'"));
    }

    #[test]
    fn test_notifies_and_guards_parsed() {
        let r = decl(json!({
            "type": "file",
            "name": "/etc/postfix/sasl_passwd",
            "content": "x",
            "mode": "0600",
            "action": "create",
            "not_if": [{"path_missing": "/etc/postfix"}],
            "notifies": [{"action": "run", "target": "execute[postmap sasl_passwd]", "timing": "immediately"}],
        }))
        .into_resource(&Node::default(), &NoTemplates)
        .unwrap();
        assert_eq!(r.guards.not_if.len(), 1);
        assert_eq!(r.notifies[0].timing, Timing::Immediately);
        assert_eq!(r.notifies[0].target.to_string(), "execute[postmap sasl_passwd]");
    }

    #[test]
    fn test_inline_template_renders_against_node() {
        let node = node_with("scale_postfix.relayhost", json!("smtp.mailgun.org"));
        let r = decl(json!({
            "type": "template",
            "name": "/etc/postfix/main.cf",
            "source": "relayhost = {{ node.scale_postfix.relayhost }}\n",
        }))
        .into_resource(&node, &NoTemplates)
        .unwrap();
        let ResourceSpec::Template(spec) = &r.spec else {
            panic!("expected template");
        };
        assert_eq!(spec.content, "relayhost = smtp.mailgun.org\n");
    }

    #[test]
    fn test_template_file_loaded_by_name() {
        let loader = |name: &str| -> Result<String> {
            assert_eq!(name, "motd.erb");
            Ok("Welcome to {{ host }}\n".to_string())
        };
        let r = decl(json!({
            "type": "template",
            "name": "/etc/motd",
            "source_file": "motd.erb",
            "variables": {"host": "scale-web1"},
        }))
        .into_resource(&Node::default(), &loader)
        .unwrap();
        let ResourceSpec::Template(spec) = &r.spec else {
            panic!("expected template");
        };
        assert_eq!(spec.source, "motd.erb");
        assert_eq!(spec.content, "Welcome to scale-web1\n");
    }

    #[test]
    fn test_render_ini_from_attribute() {
        let node = node_with(
            "fb_yum_repos.config",
            json!({"main": {"gpgcheck": true, "installonly_limit": 3}}),
        );
        let r = decl(json!({
            "type": "template",
            "name": "/etc/dnf/dnf.conf",
            "render": {"format": "ini", "attribute": "fb_yum_repos.config"},
        }))
        .into_resource(&node, &NoTemplates)
        .unwrap();
        let ResourceSpec::Template(spec) = &r.spec else {
            panic!("expected template");
        };
        assert_eq!(spec.content, "[main]\ngpgcheck=1\ninstallonly_limit=3\n");
    }

    #[test]
    fn test_template_needs_one_source() {
        let err = decl(json!({"type": "template", "name": "/etc/x"}))
            .into_resource(&Node::default(), &NoTemplates)
            .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn test_builder_from_attribute() {
        let node = node_with(
            "scale_ssh.keys",
            json!({"root": ["ssh-ed25519 AAAA root@bastion"]}),
        );
        let builder: BuilderDecl = serde_json::from_value(json!({
            "kind": "authorized_keys",
            "dir": "/etc/ssh/authorized_keys",
            "attribute": "scale_ssh.keys",
            "owner": "root",
            "mode": "0644",
        }))
        .unwrap();
        let resources = builder.build(&node).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].name, "/etc/ssh/authorized_keys/root");
    }
}
