//! Retention policy: which versions of a package may be deleted.

use chrono::NaiveDate;
use regex::Regex;

use crate::bulk::{delete_many, DeletionReport};
use crate::error::{Error, Result};
use crate::github::{PackageRegistry, PackageVersion};

pub const DEFAULT_TAGS_TO_KEEP: [&str; 2] = ["latest", r"\d+\.\d+\.\d+"];
pub const DEFAULT_MAX_AGE_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    tags_to_keep: Vec<Regex>,
    max_age_days: i64,
}

impl RetentionPolicy {
    /// Builds a policy. Patterns must match a whole tag to protect it.
    pub fn new<I, S>(tags_to_keep: I, max_age_days: i64) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags_to_keep = tags_to_keep
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                    Error::configuration(format!("invalid tag pattern {pattern:?}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tags_to_keep,
            max_age_days,
        })
    }

    pub fn max_age_days(&self) -> i64 {
        self.max_age_days
    }

    /// Whether any tag of the version matches a protected pattern.
    pub fn is_protected(&self, version: &PackageVersion) -> bool {
        version
            .tags()
            .iter()
            .any(|tag| self.tags_to_keep.iter().any(|pattern| pattern.is_match(tag)))
    }

    /// Age in calendar days, ignoring the time of day.
    pub fn age_days(version: &PackageVersion, today: NaiveDate) -> i64 {
        (today - version.updated_at.date_naive()).num_days()
    }

    pub fn is_candidate(&self, version: &PackageVersion, today: NaiveDate) -> bool {
        Self::age_days(version, today) > self.max_age_days && !self.is_protected(version)
    }

    /// The deletion candidates among `versions`, in their original order.
    pub fn candidates(&self, versions: Vec<PackageVersion>, today: NaiveDate) -> Vec<PackageVersion> {
        versions
            .into_iter()
            .filter(|version| self.is_candidate(version, today))
            .collect()
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            tags_to_keep: DEFAULT_TAGS_TO_KEEP
                .iter()
                .map(|pattern| {
                    Regex::new(&format!("^(?:{pattern})$")).expect("default tag patterns are valid")
                })
                .collect(),
            max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }
}

/// Lists the versions of a package that `policy` allows to delete.
pub async fn plan_cleanup(
    registry: &(impl PackageRegistry + ?Sized),
    owner: &str,
    package: &str,
    policy: &RetentionPolicy,
    today: NaiveDate,
) -> Result<Vec<PackageVersion>> {
    let versions = registry.list_package_versions(owner, package).await?;
    let total = versions.len();
    let candidates = policy.candidates(versions, today);
    log::info!(
        "{} of {} versions of {}/{} are eligible for deletion (max age {} days)",
        candidates.len(),
        total,
        owner,
        package,
        policy.max_age_days()
    );
    Ok(candidates)
}

/// Deletes the versions of a package that `policy` allows to delete.
pub async fn cleanup(
    registry: &(impl PackageRegistry + ?Sized),
    owner: &str,
    package: &str,
    policy: &RetentionPolicy,
    max_parallel: usize,
    today: NaiveDate,
) -> Result<DeletionReport<PackageVersion>> {
    let candidates = plan_cleanup(registry, owner, package, policy, today).await?;
    Ok(delete_many(registry, owner, package, candidates, max_parallel).await)
}
