//! EC2-compatible metadata tree
//!
//! Served under `/2009-04-04`. Each entry selects a field of the machine
//! record; `meta-data` and its `operating-system` sub-tree qualify their
//! descendants with a base query so leaf queries stay short.

use crate::filter::Composite;
use hegel_common::Result;

/// Path prefix of the EC2 metadata API version Hegel emulates
pub const EC2_VERSION_PREFIX: &str = "/2009-04-04";

/// Build the EC2 metadata tree
///
/// # Errors
/// Returns `Error::InvalidFilter` if the tree definition is malformed.
pub fn ec2_tree() -> Result<Composite> {
    let license_activation = Composite::builder(".license_activation")
        .terminal("state", ".state")
        .build();

    let operating_system = Composite::builder(".operating_system")
        .terminal("slug", ".slug")
        .terminal("distro", ".distro")
        .terminal("version", ".version")
        .composite("license_activation", license_activation)
        .terminal("image_tag", ".image_tag")
        .build();

    let meta_data = Composite::builder(".metadata.instance")
        .terminal("instance-id", ".id")
        .terminal("hostname", ".hostname")
        .terminal("iqn", ".iqn")
        .terminal("plan", ".plan")
        .terminal("facility", ".facility")
        .terminal("tags", ".tags[]")
        .composite("operating-system", operating_system)
        .terminal("public-keys", ".ssh_keys[]")
        .gated_terminal("spot", ".spot.termination_time", ".spot")
        .terminal(
            "public-ipv4",
            ".network.addresses[] | select(.address_family == 4 and .public == true) | .address",
        )
        .terminal(
            "public-ipv6",
            ".network.addresses[] | select(.address_family == 6 and .public == true) | .address",
        )
        .terminal(
            "local-ipv4",
            ".network.addresses[] | select(.address_family == 4 and .public == false) | .address",
        )
        .build();

    Composite::builder(".")
        .terminal("user-data", ".metadata.userdata")
        .composite("meta-data", meta_data)
        .build()
}

/// Strip the version prefix and surrounding slashes from a request path
///
/// Returns `None` if the path is not under [`EC2_VERSION_PREFIX`].
#[must_use]
pub fn relative_path(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(EC2_VERSION_PREFIX)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    Some(rest.trim_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Child, FilterNode};

    #[test]
    fn test_tree_builds() {
        let tree = ec2_tree().unwrap();
        let names: Vec<&str> = tree.children().iter().map(Child::name).collect();
        assert_eq!(names, vec!["user-data", "meta-data"]);
        assert!(tree.depth() <= 4);
    }

    #[test]
    fn test_meta_data_children() {
        let tree = ec2_tree().unwrap();
        let Some(FilterNode::Composite(meta)) = tree.child("meta-data").map(Child::node) else {
            panic!("meta-data is not a directory");
        };
        let names: Vec<&str> = meta.children().iter().map(Child::name).collect();
        assert_eq!(
            names,
            vec![
                "instance-id",
                "hostname",
                "iqn",
                "plan",
                "facility",
                "tags",
                "operating-system",
                "public-keys",
                "spot",
                "public-ipv4",
                "public-ipv6",
                "local-ipv4",
            ]
        );
        assert!(meta.child("spot").unwrap().gate().is_some());
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(relative_path("/2009-04-04"), Some(""));
        assert_eq!(relative_path("/2009-04-04/"), Some(""));
        assert_eq!(
            relative_path("/2009-04-04/meta-data/hostname/"),
            Some("meta-data/hostname")
        );
        assert_eq!(relative_path("/2009-04-045"), None);
        assert_eq!(relative_path("/metadata"), None);
    }
}
