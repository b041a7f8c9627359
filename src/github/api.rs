use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum Account {
    User {
        id: u64,
        node_id: String,
        login: String,
        #[serde(default)]
        name: Option<String>,
    },
    Organization {
        id: u64,
        node_id: String,
        login: String,
    },
}

impl Account {
    pub fn login(&self) -> &str {
        match self {
            Self::User { login, .. } | Self::Organization { login, .. } => login,
        }
    }
}

impl Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.login())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Repository {
    pub id: u64,
    pub node_id: String,
    pub name: String,
    pub full_name: String,
    pub url: String,
    pub html_url: String,
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Package {
    pub id: u64,
    pub name: String,
    pub owner: Account,
    pub url: String,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub repository: Repository,
}

impl Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl Package {
    /// One line for terminal output: name, id, owner and repository.
    pub fn summary(&self) -> String {
        format!(
            "{} id={} owner={} repository={}",
            self.name, self.id, self.owner, self.repository.full_name
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PackageVersion {
    pub id: u64,
    #[serde(rename = "name")]
    pub digest: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: PackageMetadata,
    /// Parent package, attached after listing. Not part of the registry payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<Package>,
}

impl PackageVersion {
    /// Container tags of this version. Empty for non-container metadata.
    pub fn tags(&self) -> &[String] {
        match &self.metadata {
            PackageMetadata::Container(container) => &container.tags,
            PackageMetadata::Docker(_) => &[],
        }
    }

    /// One line for terminal output: package, id, update time and metadata.
    pub fn summary(&self) -> String {
        let package = self
            .package
            .as_ref()
            .map_or_else(|| "?".to_string(), ToString::to_string);
        let metadata = match &self.metadata {
            PackageMetadata::Container(container) => container
                .field_names()
                .into_iter()
                .filter_map(|name| container.field(name).map(|value| format!("{name}={value}")))
                .collect::<Vec<_>>()
                .join(" "),
            PackageMetadata::Docker(docker) => format!("docker={}", Value::Object(docker.docker.clone())),
        };
        format!(
            "{} id={} updated_at={} {}",
            package,
            self.id,
            self.updated_at.to_rfc3339(),
            metadata
        )
    }
}

/// Version metadata, discriminated by the normalised `package_type` field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RawMetadata", into = "RawMetadata")]
pub enum PackageMetadata {
    Container(ContainerMetadata),
    Docker(DockerMetadata),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ContainerMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
    /// Manifest fields this crate does not model.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ContainerMetadata {
    #[cfg(test)]
    pub fn new(tags: Vec<String>) -> Self {
        Self {
            tags,
            extra: Map::new(),
        }
    }

    /// Looks up a manifest field by name, including ones not modelled here.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "tags" => serde_json::to_value(&self.tags).ok(),
            _ => self.extra.get(name).cloned(),
        }
    }

    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.extra.keys().map(String::as_str).collect();
        names.push("tags");
        names.sort_unstable();
        names
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DockerMetadata {
    pub docker: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataKind {
    Container,
    Docker,
}

impl MetadataKind {
    fn parse(package_type: &str) -> Option<Self> {
        match normalise_package_type(package_type).as_str() {
            "container" => Some(Self::Container),
            "docker" => Some(Self::Docker),
            _ => None,
        }
    }
}

/// Lower-cases the discriminator and strips a trailing `metadata`.
pub fn normalise_package_type(package_type: &str) -> String {
    let lower = package_type.trim().to_lowercase();
    match lower.strip_suffix("metadata") {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct RawMetadata {
    package_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    container: Option<ContainerMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    docker: Option<Map<String, Value>>,
}

impl TryFrom<RawMetadata> for PackageMetadata {
    type Error = String;

    fn try_from(raw: RawMetadata) -> Result<Self, Self::Error> {
        match MetadataKind::parse(&raw.package_type) {
            Some(MetadataKind::Container) => Ok(Self::Container(raw.container.unwrap_or_default())),
            Some(MetadataKind::Docker) => Ok(Self::Docker(DockerMetadata {
                docker: raw.docker.unwrap_or_default(),
            })),
            None => Err(format!("unknown package type {:?}", raw.package_type)),
        }
    }
}

impl From<PackageMetadata> for RawMetadata {
    fn from(metadata: PackageMetadata) -> Self {
        match metadata {
            PackageMetadata::Container(container) => Self {
                package_type: "container".to_string(),
                container: Some(container),
                docker: None,
            },
            PackageMetadata::Docker(docker) => Self {
                package_type: "docker".to_string(),
                container: None,
                docker: Some(docker.docker),
            },
        }
    }
}
