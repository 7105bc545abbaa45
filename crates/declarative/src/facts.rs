//! Host facts exposed as automatic attributes

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::attributes::{AttrPath, AttributeBuilder, Layer};
use crate::error::Result;

/// Discovered facts about the host being converged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facts {
    pub hostname: String,
    pub fqdn: String,
    /// `ID` from os-release (`centos`, `rocky`, `debian`, `ubuntu`, ...)
    pub platform: String,
    /// Derived family (`rhel`, `debian`, `fedora`, or the raw id)
    pub platform_family: String,
    /// `VERSION_ID` from os-release
    pub platform_version: String,
    pub systemd: bool,
    pub container: bool,
}

impl Facts {
    /// Parse the platform fields from `/etc/os-release` content
    pub fn with_os_release(mut self, content: &str) -> Self {
        let mut id_like = String::new();
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "ID" => self.platform = value,
                "VERSION_ID" => self.platform_version = value,
                "ID_LIKE" => id_like = value,
                _ => {}
            }
        }
        self.platform_family = family_for(&self.platform, &id_like);
        self
    }

    pub fn is_centos(&self) -> bool {
        self.platform == "centos"
    }

    pub fn is_rhel_family(&self) -> bool {
        self.platform_family == "rhel"
    }

    pub fn is_debian_family(&self) -> bool {
        self.platform_family == "debian"
    }

    /// Major version, when the version string starts with digits
    pub fn major_version(&self) -> Option<u32> {
        self.platform_version
            .split('.')
            .next()
            .and_then(|v| v.parse().ok())
    }

    /// Enterprise Linux at or above `version`
    pub fn el_min_version(&self, version: u32) -> bool {
        self.is_rhel_family() && self.major_version().is_some_and(|v| v >= version)
    }

    /// Enterprise Linux at or below `version`
    pub fn el_max_version(&self, version: u32) -> bool {
        self.is_rhel_family() && self.major_version().is_some_and(|v| v <= version)
    }

    /// Facts as an attribute map
    pub fn to_value(&self) -> Value {
        json!({
            "hostname": self.hostname,
            "fqdn": self.fqdn,
            "platform": self.platform,
            "platform_family": self.platform_family,
            "platform_version": self.platform_version,
            "systemd": self.systemd,
            "container": self.container,
        })
    }

    /// Write every fact into the automatic layer at the root of the tree
    pub fn apply_to(&self, attrs: &mut AttributeBuilder) -> Result<()> {
        if let Value::Object(map) = self.to_value() {
            for (key, value) in map {
                attrs.set(Layer::Automatic, &AttrPath::from_segments([key]), value)?;
            }
        }
        Ok(())
    }
}

fn family_for(id: &str, id_like: &str) -> String {
    let like: Vec<&str> = id_like.split_whitespace().collect();
    match id {
        "centos" | "rhel" | "rocky" | "almalinux" | "ol" => "rhel".to_string(),
        "fedora" => "fedora".to_string(),
        "debian" | "ubuntu" => "debian".to_string(),
        _ if like.contains(&"rhel") => "rhel".to_string(),
        _ if like.contains(&"debian") => "debian".to_string(),
        other => other.to_string(),
    }
}
