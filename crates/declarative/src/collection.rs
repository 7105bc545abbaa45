//! The ordered resource collection

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::notify::{Notification, Timing};
use crate::resource::{Resource, ResourceKey, ResourceSpec};

/// Resources in declaration order, unique by `type[name]`
#[derive(Debug, Default)]
pub struct ResourceCollection {
    resources: Vec<Resource>,
    index: HashMap<ResourceKey, usize>,
    /// `cron.d` file of each cron job, by the job that claimed it
    cron_files: HashMap<PathBuf, ResourceKey>,
    source: Option<String>,
}

impl ResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recipe name recorded on resources added from now on
    pub fn set_source(&mut self, recipe: Option<String>) {
        self.source = recipe;
    }

    /// Validate and append a resource
    pub fn add(&mut self, mut resource: Resource) -> Result<()> {
        resource.validate()?;
        let key = resource.key();
        if self.index.contains_key(&key) {
            return Err(Error::DuplicateResource(key.to_string()));
        }
        if let ResourceSpec::Cron(spec) = &resource.spec {
            let path = spec.file_path(&resource.name);
            if let Some(owner) = self.cron_files.get(&path) {
                return Err(Error::invalid(
                    &key,
                    format!("writes {} like {owner}", path.display()),
                ));
            }
            self.cron_files.insert(path, key.clone());
        }
        if resource.declared_in.is_none() {
            resource.declared_in = self.source.clone();
        }
        self.index.insert(key, self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.index.get(key).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    /// Normalize subscriptions and check every notification edge
    ///
    /// Fails on notifications to undeclared resources, actions the target
    /// kind does not support, and cycles among immediate notifications.
    pub fn resolve(mut self) -> Result<ResolvedCollection> {
        self.normalize_subscriptions()?;

        for resource in &self.resources {
            for notification in &resource.notifies {
                let target = self.get(&notification.target).ok_or_else(|| {
                    Error::UnknownNotificationTarget {
                        from: resource.key().to_string(),
                        target: notification.target.to_string(),
                    }
                })?;
                if !target.kind().supports(notification.action) {
                    return Err(Error::UnsupportedAction {
                        key: target.key().to_string(),
                        action: notification.action.to_string(),
                    });
                }
            }
        }

        self.check_immediate_cycles()?;
        log::debug!("Resolved {} resources", self.resources.len());
        Ok(ResolvedCollection { inner: self })
    }

    /// `B subscribes to A` becomes `A notifies B`
    fn normalize_subscriptions(&mut self) -> Result<()> {
        let mut moved: Vec<(usize, Notification)> = Vec::new();
        for resource in &mut self.resources {
            let subscriber = resource.key();
            for sub in std::mem::take(&mut resource.subscribes) {
                let source = *self.index.get(&sub.target).ok_or_else(|| {
                    Error::UnknownNotificationTarget {
                        from: subscriber.to_string(),
                        target: sub.target.to_string(),
                    }
                })?;
                moved.push((source, Notification::new(sub.action, subscriber.clone(), sub.timing)));
            }
        }
        for (source, notification) in moved {
            let notifies = &mut self.resources[source].notifies;
            if !notifies.contains(&notification) {
                notifies.push(notification);
            }
        }
        Ok(())
    }

    fn check_immediate_cycles(&self) -> Result<()> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..self.resources.len()).map(|i| graph.add_node(i)).collect();
        for (i, resource) in self.resources.iter().enumerate() {
            for notification in &resource.notifies {
                if notification.timing != Timing::Immediately {
                    continue;
                }
                if let Some(&target) = self.index.get(&notification.target) {
                    graph.add_edge(nodes[i], nodes[target], ());
                }
            }
        }
        toposort(&graph, None).map(|_| ()).map_err(|cycle| {
            let at = graph[cycle.node_id()];
            Error::NotificationCycle(self.resources[at].key().to_string())
        })
    }
}

/// A collection whose notification edges have been checked
#[derive(Debug)]
pub struct ResolvedCollection {
    inner: ResourceCollection,
}

impl ResolvedCollection {
    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.inner.get(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.inner.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Action, ResourceType};

    fn svc(name: &str) -> ResourceKey {
        ResourceKey::new(ResourceType::Service, name)
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut c = ResourceCollection::new();
        c.add(Resource::service("sshd")).unwrap();
        let err = c.add(Resource::service("sshd")).unwrap_err();
        assert!(matches!(err, Error::DuplicateResource(k) if k == "service[sshd]"));
    }

    #[test]
    fn test_same_name_different_kind_allowed() {
        let mut c = ResourceCollection::new();
        c.add(Resource::service("chef")).unwrap();
        c.add(Resource::package("chef")).unwrap();
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut c = ResourceCollection::new();
        c.add(Resource::file("/etc/ssh/sshd_config", Some("")).notifies(
            Action::Restart,
            svc("sshd"),
            Timing::Delayed,
        ))
        .unwrap();
        assert!(matches!(c.resolve(), Err(Error::UnknownNotificationTarget { .. })));
    }

    #[test]
    fn test_unsupported_notification_action_rejected() {
        let mut c = ResourceCollection::new();
        c.add(Resource::service("sshd")).unwrap();
        c.add(Resource::file("/etc/motd", Some("hi")).notifies(
            Action::Install,
            svc("sshd"),
            Timing::Delayed,
        ))
        .unwrap();
        assert!(matches!(c.resolve(), Err(Error::UnsupportedAction { .. })));
    }

    #[test]
    fn test_subscribes_becomes_notifies_on_source() {
        let file = ResourceKey::new(ResourceType::File, "/etc/ssh/sshd_config");
        let mut c = ResourceCollection::new();
        c.add(Resource::file("/etc/ssh/sshd_config", Some("Port 22\n"))).unwrap();
        c.add(Resource::service("sshd").subscribes(Action::Restart, file.clone(), Timing::Delayed))
            .unwrap();
        let resolved = c.resolve().unwrap();
        let source = resolved.get(&file).unwrap();
        assert_eq!(
            source.notifies,
            vec![Notification::new(Action::Restart, svc("sshd"), Timing::Delayed)]
        );
        assert!(resolved.get(&svc("sshd")).unwrap().subscribes.is_empty());
    }

    #[test]
    fn test_immediate_cycle_rejected() {
        let a = ResourceKey::new(ResourceType::Execute, "a");
        let b = ResourceKey::new(ResourceType::Execute, "b");
        let mut c = ResourceCollection::new();
        c.add(Resource::execute("a", "true").notifies(Action::Run, b.clone(), Timing::Immediately))
            .unwrap();
        c.add(Resource::execute("b", "true").notifies(Action::Run, a, Timing::Immediately))
            .unwrap();
        assert!(matches!(c.resolve(), Err(Error::NotificationCycle(_))));
    }

    #[test]
    fn test_delayed_cycle_resolves_and_drains() {
        use crate::attributes::Node;
        use crate::context::ApplyContext;
        use crate::context::test_support::MockRunner;
        use crate::executor::converge_simple;

        let a = ResourceKey::new(ResourceType::Execute, "a");
        let b = ResourceKey::new(ResourceType::Execute, "b");
        let mut c = ResourceCollection::new();
        c.add(Resource::execute("a", "run-a").notifies(Action::Run, b.clone(), Timing::Delayed))
            .unwrap();
        c.add(Resource::execute("b", "run-b").notifies(Action::Run, a, Timing::Delayed))
            .unwrap();
        let resolved = c.resolve().unwrap();

        let runner = MockRunner::default();
        let node = Node::default();
        let report = converge_simple(&resolved, &ApplyContext::new(&runner, &node));
        assert!(report.is_success());
        // Main list runs each once, then one delayed run each
        assert_eq!(
            runner.calls(),
            vec!["sh -c run-a", "sh -c run-b", "sh -c run-b", "sh -c run-a"]
        );
    }

    #[test]
    fn test_cron_names_sharing_a_file_rejected() {
        let mut c = ResourceCollection::new();
        c.add(Resource::cron("remove override files", "0 * * * *", "true"))
            .unwrap();
        let err = c
            .add(Resource::cron("remove_override_files", "0 * * * *", "true"))
            .unwrap_err();
        assert!(err.to_string().contains("cron[remove override files]"));
        assert!(err.to_string().contains("remove_override_files"));

        c.add(Resource::cron("remove-override-files", "0 * * * *", "true"))
            .unwrap();
    }

    #[test]
    fn test_source_recorded() {
        let mut c = ResourceCollection::new();
        c.set_source(Some("fb_ssh::default".into()));
        c.add(Resource::service("sshd")).unwrap();
        assert_eq!(
            c.get(&svc("sshd")).unwrap().declared_in.as_deref(),
            Some("fb_ssh::default")
        );
    }
}
