//! Bounded parallel deletion of package versions.

use futures::stream::{self, StreamExt};

use crate::error::{Error, Result};
use crate::github::{PackageRegistry, PackageVersion};

/// Default number of deletions in flight for a retention cleanup.
pub const DEFAULT_MAX_PARALLEL: usize = 30;

/// Default number of deletions in flight when deleting explicit ids.
pub const DEFAULT_MAX_PARALLEL_BY_ID: usize = 50;

/// Something that names a package version to delete.
pub trait DeletionTarget {
    fn version_id(&self) -> u64;
}

impl DeletionTarget for u64 {
    fn version_id(&self) -> u64 {
        *self
    }
}

impl DeletionTarget for PackageVersion {
    fn version_id(&self) -> u64 {
        self.id
    }
}

/// Outcome of a batch. Both lists keep the order in which targets were
/// submitted.
#[derive(Debug)]
pub struct DeletionReport<T> {
    pub deleted: Vec<T>,
    pub failed: Vec<(T, Error)>,
}

impl<T> Default for DeletionReport<T> {
    fn default() -> Self {
        Self {
            deleted: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> DeletionReport<T> {
    pub fn total(&self) -> usize {
        self.deleted.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// The deleted targets, or [`Error::BatchPartialFailure`] if anything
    /// failed.
    pub fn into_result(self) -> Result<Vec<T>> {
        if self.is_complete() {
            Ok(self.deleted)
        } else {
            Err(Error::BatchPartialFailure {
                failed: self.failed.len(),
                total: self.total(),
            })
        }
    }
}

/// Deletes every target with at most `max_parallel` requests in flight.
///
/// Deletions are issued in input order and a queued one starts as soon as
/// any running deletion completes. A failing deletion does not stop the
/// others; it is recorded in [`DeletionReport::failed`].
pub async fn delete_many<R, T>(
    registry: &R,
    owner: &str,
    package: &str,
    targets: Vec<T>,
    max_parallel: usize,
) -> DeletionReport<T>
where
    R: PackageRegistry + ?Sized,
    T: DeletionTarget,
{
    let total = targets.len();
    log::debug!(
        "Deleting {} versions of {}/{} with max_parallel={}",
        total,
        owner,
        package,
        max_parallel
    );

    // A slot frees as soon as any deletion finishes; input order is restored
    // afterwards from the submission index.
    let mut outcomes: Vec<(usize, T, Result<()>)> = stream::iter(targets.into_iter().enumerate())
        .map(move |(index, target)| async move {
            let result = registry
                .delete_package_version(owner, package, target.version_id())
                .await;
            (index, target, result)
        })
        .buffer_unordered(max_parallel.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|(index, _, _)| *index);

    let mut report = DeletionReport::default();
    for (_, target, result) in outcomes {
        match result {
            Ok(()) => {
                log::info!("Deleted {}/{}:{}", owner, package, target.version_id());
                report.deleted.push(target);
            }
            Err(error) => {
                log::warn!(
                    "Failed to delete {}/{}:{}: {}",
                    owner,
                    package,
                    target.version_id(),
                    error
                );
                report.failed.push((target, error));
            }
        }
    }

    log::info!(
        "Deleted {}/{} versions of {}/{}",
        report.deleted.len(),
        total,
        owner,
        package
    );
    report
}
