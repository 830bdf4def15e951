//! One-shot conversions between `.apkg` files and generic packages.
//!
//! Both directions stage the package, convert it, and clean up. Cleanup
//! problems never fail the conversion; they come back as warnings.

use deckhand_package as pkg;
use std::path::Path;
use tracing::instrument;

use crate::Outcome;
use crate::package::AnkiPackage;

/// Read an `.apkg` file into a generic package.
#[instrument(name = "importing package", skip_all, fields(path = %path.as_ref().display()))]
pub async fn archive_to_generic(path: impl AsRef<Path>) -> Outcome<pkg::Package> {
    let (mut package, mut issues) = match AnkiPackage::from_archive_file(path).await.into_parts() {
        (Ok(package), issues) => (package, issues),
        (Err(err), _) => return Outcome::Failure(err),
    };
    let converted = package.to_generic_package().await;
    issues.extend(package.cleanup().await);
    match converted {
        Ok(generic) => Outcome::with_issues(generic, issues),
        Err(err) => Outcome::Failure(err),
    }
}

/// Write a generic package as an `.apkg` file.
#[instrument(name = "exporting package", skip_all, fields(path = %path.as_ref().display()))]
pub async fn generic_to_archive(generic: &pkg::Package, path: impl AsRef<Path>) -> Outcome<()> {
    let (mut package, mut issues) = match AnkiPackage::from_generic_package(generic).await.into_parts() {
        (Ok(package), issues) => (package, issues),
        (Err(err), _) => return Outcome::Failure(err),
    };
    let written = package.to_archive_file(path).await;
    issues.extend(package.cleanup().await);
    match written {
        Ok(()) => Outcome::with_issues((), issues),
        Err(err) => Outcome::Failure(err),
    }
}
