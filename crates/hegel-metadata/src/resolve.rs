//! Path resolution against the filter tree
//!
//! Resolution only looks at the tree, never at a record, so it is pure:
//! the same path against the same tree always resolves the same way.

use crate::filter::{Composite, FilterNode, RESERVED_BASE_KEY};
use crate::query::Query;
use hegel_common::{Error, Result};

/// Outcome of resolving a metadata path
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved<'t> {
    /// The path names an item; run this fully qualified query
    Query(Query),
    /// The path names a directory; list its children
    Listing {
        /// The directory reached
        dir: &'t Composite,
        /// Accumulated base query of the directory, for evaluating gates
        base: Query,
    },
}

/// Resolve a `/`-separated path (relative to the tree root) against `root`
///
/// Empty segments are skipped, so leading, trailing and doubled slashes are
/// harmless.
///
/// # Errors
/// Returns `Error::InvalidMetadataItem` if a segment is the reserved base
/// key, names no child, or follows an item.
pub fn resolve<'t>(root: &'t Composite, path: &str) -> Result<Resolved<'t>> {
    let mut dir = root;
    let mut base = root.base().clone();
    let mut segments = path.split('/').filter(|s| !s.is_empty());

    while let Some(segment) = segments.next() {
        if segment == RESERVED_BASE_KEY {
            return Err(Error::invalid_item(segment));
        }

        let child = dir
            .child(segment)
            .ok_or_else(|| Error::invalid_item(segment))?;

        match child.node() {
            FilterNode::Terminal(query) => {
                if let Some(extra) = segments.next() {
                    return Err(Error::invalid_item(extra));
                }
                return Ok(Resolved::Query(base.then(query)));
            }
            FilterNode::Composite(sub) => {
                base = base.then(sub.base());
                dir = sub;
            }
        }
    }

    Ok(Resolved::Listing { dir, base })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec2::ec2_tree;

    fn query_text(root: &Composite, path: &str) -> String {
        match resolve(root, path).unwrap() {
            Resolved::Query(q) => q.to_string(),
            Resolved::Listing { .. } => panic!("{path} resolved to a listing"),
        }
    }

    fn listing_names(root: &Composite, path: &str) -> Vec<String> {
        match resolve(root, path).unwrap() {
            Resolved::Listing { dir, .. } => {
                dir.children().iter().map(|c| c.name().to_string()).collect()
            }
            Resolved::Query(q) => panic!("{path} resolved to {q}"),
        }
    }

    #[test]
    fn test_terminal_paths() {
        let tree = ec2_tree().unwrap();
        assert_eq!(query_text(&tree, "user-data"), ".metadata.userdata");
        assert_eq!(
            query_text(&tree, "meta-data/hostname"),
            ".metadata.instance.hostname"
        );
        assert_eq!(
            query_text(&tree, "meta-data/operating-system/license_activation/state"),
            ".metadata.instance.operating_system.license_activation.state"
        );
        assert_eq!(
            query_text(&tree, "meta-data/public-ipv6"),
            ".metadata.instance.network.addresses[] \
             | select(.address_family == 6 and .public == true) | .address"
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let tree = ec2_tree().unwrap();
        for path in ["meta-data/tags", "meta-data/operating-system/slug", "user-data"] {
            assert_eq!(resolve(&tree, path).unwrap(), resolve(&tree, path).unwrap());
        }
    }

    #[test]
    fn test_directory_paths() {
        let tree = ec2_tree().unwrap();
        assert_eq!(listing_names(&tree, ""), vec!["user-data", "meta-data"]);
        assert_eq!(listing_names(&tree, "meta-data/").len(), 12);
        assert_eq!(
            listing_names(&tree, "/meta-data//operating-system/"),
            vec!["slug", "distro", "version", "license_activation", "image_tag"]
        );

        let Resolved::Listing { base, .. } =
            resolve(&tree, "meta-data/operating-system").unwrap()
        else {
            panic!("expected listing");
        };
        assert_eq!(base.to_string(), ".metadata.instance.operating_system");
    }

    #[test]
    fn test_base_segment_rejected() {
        let tree = ec2_tree().unwrap();
        for path in ["_base", "meta-data/_base", "meta-data/operating-system/_base"] {
            assert!(matches!(
                resolve(&tree, path),
                Err(Error::InvalidMetadataItem(item)) if item == "_base"
            ));
        }
    }

    #[test]
    fn test_unknown_segments_rejected() {
        let tree = ec2_tree().unwrap();
        for path in [
            "nope",
            "meta-data/nope",
            "meta-data/operating-system/nope",
            "meta-data/operating-system/license_activation/nope",
        ] {
            assert!(matches!(
                resolve(&tree, path),
                Err(Error::InvalidMetadataItem(item)) if item == "nope"
            ));
        }
    }

    #[test]
    fn test_segments_after_item_rejected() {
        let tree = ec2_tree().unwrap();
        assert!(matches!(
            resolve(&tree, "meta-data/hostname/extra"),
            Err(Error::InvalidMetadataItem(item)) if item == "extra"
        ));
        // a trailing slash after an item is not an extra segment
        assert!(resolve(&tree, "meta-data/hostname/").is_ok());
    }
}
