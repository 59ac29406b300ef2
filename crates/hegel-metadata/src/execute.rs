//! Query execution and response rendering

use crate::filter::Composite;
use crate::query::Query;
use crate::resolve::Resolved;
use hegel_common::{Error, Result};
use serde_json::Value;

/// Produce the response body for a resolved path against `record`
///
/// # Errors
/// Returns `Error::Query` if the query cannot be evaluated on this record.
pub fn execute(resolved: &Resolved<'_>, record: &Value) -> Result<Vec<u8>> {
    match resolved {
        Resolved::Query(query) => run_query(query, record),
        Resolved::Listing { dir, base } => Ok(render_listing(dir, base, record)),
    }
}

/// Evaluate `query` against `record` and render the results
///
/// # Errors
/// Returns `Error::Query` if the query cannot be evaluated on this record.
pub fn run_query(query: &Query, record: &Value) -> Result<Vec<u8>> {
    let values = query.evaluate(record)?;
    render_values(&values)
}

/// Render query results one per line
///
/// Strings are written raw, other values as compact JSON, `null`s are
/// dropped. There is no trailing newline.
///
/// # Errors
/// Returns `Error::Query` if a value cannot be serialized.
pub fn render_values(values: &[&Value]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for value in values.iter().filter(|v| !v.is_null()) {
        if !out.is_empty() {
            out.push(b'\n');
        }
        match value {
            Value::String(s) => out.extend_from_slice(s.as_bytes()),
            other => serde_json::to_writer(&mut out, other)
                .map_err(|e| Error::query(format!("failed to encode result: {e}")))?,
        }
    }
    Ok(out)
}

/// List a directory's children, one name per line
///
/// Gated children are listed only when their gate, qualified by the
/// directory's `base`, yields a value on `record`.
#[must_use]
pub fn render_listing(dir: &Composite, base: &Query, record: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    for child in dir.children() {
        if let Some(gate) = child.gate()
            && !base.then(gate).is_present_in(record)
        {
            continue;
        }
        out.extend_from_slice(child.name().as_bytes());
        out.push(b'\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec2::ec2_tree;
    use crate::resolve::resolve;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "metadata": {
                "userdata": "#!/bin/sh\necho hi",
                "instance": {
                    "id": "7c9a1e2f",
                    "hostname": "node-1",
                    "iqn": "iqn.2020-01.net.example:node-1",
                    "plan": "c3.small.x86",
                    "facility": "ewr1",
                    "tags": ["db", "primary"],
                    "ssh_keys": ["ssh-ed25519 AAAA one", "ssh-rsa BBBB two"],
                    "operating_system": {
                        "slug": "ubuntu_22_04",
                        "distro": "ubuntu",
                        "version": "22.04",
                        "image_tag": "abc123",
                        "license_activation": {"state": "unlicensed"}
                    },
                    "network": {
                        "addresses": [
                            {"address_family": 4, "public": true, "address": "147.75.1.2"},
                            {"address_family": 6, "public": true, "address": "2604:1380::1"},
                            {"address_family": 4, "public": false, "address": "10.88.0.3"}
                        ]
                    }
                }
            }
        })
    }

    fn get(path: &str, rec: &Value) -> String {
        let tree = ec2_tree().unwrap();
        let resolved = resolve(&tree, path).unwrap();
        String::from_utf8(execute(&resolved, rec).unwrap()).unwrap()
    }

    #[test]
    fn test_scalar_items() {
        let rec = record();
        assert_eq!(get("meta-data/hostname", &rec), "node-1");
        assert_eq!(get("meta-data/instance-id", &rec), "7c9a1e2f");
        assert_eq!(get("meta-data/operating-system/slug", &rec), "ubuntu_22_04");
        assert_eq!(
            get("meta-data/operating-system/license_activation/state", &rec),
            "unlicensed"
        );
        assert_eq!(get("user-data", &rec), "#!/bin/sh\necho hi");
    }

    #[test]
    fn test_list_items() {
        let rec = record();
        assert_eq!(get("meta-data/tags", &rec), "db\nprimary");
        assert_eq!(
            get("meta-data/public-keys", &rec),
            "ssh-ed25519 AAAA one\nssh-rsa BBBB two"
        );
        assert_eq!(get("meta-data/public-ipv4", &rec), "147.75.1.2");
        assert_eq!(get("meta-data/public-ipv6", &rec), "2604:1380::1");
        assert_eq!(get("meta-data/local-ipv4", &rec), "10.88.0.3");
    }

    #[test]
    fn test_missing_items_are_empty() {
        let rec = json!({"metadata": {"instance": {}}});
        assert_eq!(get("meta-data/hostname", &rec), "");
        assert_eq!(get("meta-data/tags", &rec), "");
        assert_eq!(get("meta-data/public-ipv4", &rec), "");
        assert_eq!(get("meta-data/spot", &rec), "");
        assert_eq!(get("meta-data/operating-system/license_activation/state", &rec), "");
    }

    #[test]
    fn test_listing_without_spot() {
        let rec = record();
        assert_eq!(
            get("meta-data", &rec),
            "instance-id\nhostname\niqn\nplan\nfacility\ntags\noperating-system\n\
             public-keys\npublic-ipv4\npublic-ipv6\nlocal-ipv4\n"
        );
        assert_eq!(get("", &rec), "user-data\nmeta-data\n");
    }

    #[test]
    fn test_listing_with_spot() {
        let mut rec = record();
        rec["metadata"]["instance"]["spot"] = json!({"termination_time": "2026-10-19T12:00:00Z"});

        let listing = get("meta-data/", &rec);
        assert!(listing.lines().any(|l| l == "spot"));
        assert!(!listing.lines().any(|l| l == "_base"));
        assert_eq!(get("meta-data/spot", &rec), "2026-10-19T12:00:00Z");
    }

    #[test]
    fn test_structured_results_are_json() {
        let rec = record();
        let query = Query::parse(".metadata.instance.operating_system.license_activation").unwrap();
        assert_eq!(
            String::from_utf8(run_query(&query, &rec).unwrap()).unwrap(),
            r#"{"state":"unlicensed"}"#
        );

        let query =
            Query::parse(".metadata.instance.network.addresses[] | .address_family").unwrap();
        assert_eq!(run_query(&query, &rec).unwrap(), b"4\n6\n4");
    }

    #[test]
    fn test_type_errors_surface() {
        let rec = json!({"metadata": {"instance": {"tags": "not-a-list"}}});
        let tree = ec2_tree().unwrap();
        let resolved = resolve(&tree, "meta-data/tags").unwrap();
        assert!(matches!(execute(&resolved, &rec), Err(Error::Query(_))));
    }
}
