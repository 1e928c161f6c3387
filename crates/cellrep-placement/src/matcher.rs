//! Placement constraint predicates.
//!
//! Each check compares what a work item asks for with what a cell
//! advertises. They are plain functions so the auctioneer and the cell can
//! apply them to any snapshot.

use std::collections::HashSet;

use cellrep_models::RootFsProviders;
use url::Url;

type TagSet<'a> = HashSet<&'a str>;

fn to_set(tags: &[String]) -> TagSet<'_> {
    tags.iter().map(String::as_str).collect()
}

fn union<'a>(a: &TagSet<'a>, b: &TagSet<'a>) -> TagSet<'a> {
    a.union(b).copied().collect()
}

fn is_subset(set: &TagSet<'_>, other: &TagSet<'_>) -> bool {
    set.iter().all(|tag| other.contains(tag))
}

/// The rootfs URL must parse and be recognised by one of the cell's
/// providers. An unparsable URL is a plain mismatch.
pub fn match_root_fs(providers: &RootFsProviders, root_fs: &str) -> bool {
    match Url::parse(root_fs) {
        Ok(url) => providers.match_url(&url),
        Err(_) => false,
    }
}

/// Every requested driver must be advertised by the cell.
pub fn match_volume_drivers(requested: &[String], available: &[String]) -> bool {
    requested.iter().all(|driver| available.contains(driver))
}

/// Every required cell tag must be requested, and every requested tag
/// must be either required or optional on the cell. Order and duplicates
/// are ignored.
pub fn match_placement_tags(desired: &[String], required: &[String], optional: &[String]) -> bool {
    let desired = to_set(desired);
    let required = to_set(required);
    let all = union(&required, &to_set(optional));

    is_subset(&required, &desired) && is_subset(&desired, &all)
}
