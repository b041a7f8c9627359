use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::Result;

pub mod api;
mod client;
mod links;
mod transport;

pub use api::{Package, PackageVersion};
pub use client::GithubClient;

/// Package operations of an organization on the registry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// All container packages of `owner`, fully paginated.
    async fn list_packages(&self, owner: &str) -> Result<Vec<Package>>;

    async fn get_package(&self, owner: &str, package: &str) -> Result<Package>;

    /// All versions of a package, each carrying a copy of the package itself.
    async fn list_package_versions(&self, owner: &str, package: &str)
        -> Result<Vec<PackageVersion>>;

    async fn delete_package_version(&self, owner: &str, package: &str, version_id: u64)
        -> Result<()>;
}

impl Package {
    /// Lists the versions of this package.
    pub async fn versions(&self, registry: &impl PackageRegistry) -> Result<Vec<PackageVersion>> {
        registry
            .list_package_versions(self.owner.login(), &self.name)
            .await
    }
}
