//! Filter tree mapping metadata path segments to queries
//!
//! A tree is built once at startup through [`CompositeBuilder`], which parses
//! every query and rejects illegal shapes (duplicate siblings, empty names,
//! children named like the reserved base key) before the server accepts a
//! single request.

use crate::query::Query;
use hegel_common::{Error, Result};

/// Reserved key that names a composite's base query; never a path segment
pub const RESERVED_BASE_KEY: &str = "_base";

/// A node of the filter tree
#[derive(Clone, Debug, PartialEq)]
pub enum FilterNode {
    /// Leaf: the query that produces this item
    Terminal(Query),
    /// Branch: a directory of further items
    Composite(Composite),
}

/// A directory of metadata items sharing a base query
#[derive(Clone, Debug, PartialEq)]
pub struct Composite {
    base: Query,
    children: Vec<Child>,
}

/// One named entry of a [`Composite`]
#[derive(Clone, Debug, PartialEq)]
pub struct Child {
    name: String,
    node: FilterNode,
    gate: Option<Query>,
}

impl Child {
    /// Path segment naming this child
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The child node
    #[must_use]
    pub const fn node(&self) -> &FilterNode {
        &self.node
    }

    /// Query (relative to the parent's base) that must yield a value for
    /// this child to appear in listings
    #[must_use]
    pub const fn gate(&self) -> Option<&Query> {
        self.gate.as_ref()
    }
}

impl Composite {
    /// Start building a composite whose descendants are qualified by `base`
    #[must_use]
    pub fn builder(base: &str) -> CompositeBuilder {
        let mut builder = CompositeBuilder {
            base: Query::identity(),
            children: Vec::new(),
            error: None,
        };
        match Query::parse(base) {
            Ok(query) => builder.base = query,
            Err(e) => builder.error = Some(e),
        }
        builder
    }

    /// Base query prefixed to every descendant's query
    #[must_use]
    pub const fn base(&self) -> &Query {
        &self.base
    }

    /// Children in declaration order
    #[must_use]
    pub fn children(&self) -> &[Child] {
        &self.children
    }

    /// Look up a child by segment name
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Child> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Deepest nesting of composites below and including this one
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|c| match &c.node {
                FilterNode::Composite(sub) => sub.depth(),
                FilterNode::Terminal(_) => 0,
            })
            .max()
            .unwrap_or(0)
    }
}

/// Builder for [`Composite`]; the first error encountered is reported by `build`
#[derive(Debug)]
pub struct CompositeBuilder {
    base: Query,
    children: Vec<Child>,
    error: Option<Error>,
}

impl CompositeBuilder {
    /// Add a leaf item
    #[must_use]
    pub fn terminal(self, name: &str, query: &str) -> Self {
        self.push_parsed(name, query, None)
    }

    /// Add a leaf item listed only when `gate` yields a value on the record
    #[must_use]
    pub fn gated_terminal(self, name: &str, query: &str, gate: &str) -> Self {
        self.push_parsed(name, query, Some(gate))
    }

    /// Add a sub-directory
    #[must_use]
    pub fn composite(mut self, name: &str, composite: Result<Composite>) -> Self {
        match composite {
            Ok(sub) => self.push(name, FilterNode::Composite(sub), None),
            Err(e) => {
                self.error.get_or_insert(e);
                self
            }
        }
    }

    /// Validate and finish the composite
    ///
    /// # Errors
    /// Returns `Error::InvalidFilter` for the first unparsable query or
    /// illegal child name recorded while building.
    pub fn build(self) -> Result<Composite> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok(Composite {
            base: self.base,
            children: self.children,
        })
    }

    fn push_parsed(mut self, name: &str, query: &str, gate: Option<&str>) -> Self {
        let parsed = Query::parse(query).and_then(|q| {
            let gate = gate.map(Query::parse).transpose()?;
            Ok((q, gate))
        });
        match parsed {
            Ok((q, gate)) => self.push(name, FilterNode::Terminal(q), gate),
            Err(e) => {
                self.error.get_or_insert(e);
                self
            }
        }
    }

    fn push(mut self, name: &str, node: FilterNode, gate: Option<Query>) -> Self {
        if self.error.is_some() {
            return self;
        }

        let problem = if name.is_empty() {
            Some("empty item name".to_string())
        } else if name == RESERVED_BASE_KEY {
            Some(format!("{RESERVED_BASE_KEY:?} is reserved"))
        } else if name.contains('/') {
            Some(format!("item name {name:?} contains '/'"))
        } else if self.children.iter().any(|c| c.name == name) {
            Some(format!("duplicate item {name:?}"))
        } else {
            None
        };

        match problem {
            Some(msg) => self.error = Some(Error::invalid_filter(msg)),
            None => self.children.push(Child {
                name: name.to_string(),
                node,
                gate,
            }),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_preserves_order() {
        let dir = Composite::builder(".os")
            .terminal("slug", ".slug")
            .terminal("distro", ".distro")
            .composite(
                "license",
                Composite::builder(".license").terminal("state", ".state").build(),
            )
            .build()
            .unwrap();

        let names: Vec<&str> = dir.children().iter().map(Child::name).collect();
        assert_eq!(names, vec!["slug", "distro", "license"]);
        assert_eq!(dir.base().to_string(), ".os");
        assert_eq!(dir.depth(), 2);
        assert!(dir.child("distro").is_some());
        assert!(dir.child("_base").is_none());
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = Composite::builder(".")
            .terminal("a", ".a")
            .terminal("a", ".b")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_rejects_reserved_and_empty_names() {
        assert!(Composite::builder(".").terminal("_base", ".x").build().is_err());
        assert!(Composite::builder(".").terminal("", ".x").build().is_err());
        assert!(Composite::builder(".").terminal("a/b", ".x").build().is_err());
    }

    #[test]
    fn test_rejects_bad_queries() {
        assert!(Composite::builder("base").build().is_err());
        assert!(Composite::builder(".").terminal("a", "a").build().is_err());
        assert!(Composite::builder(".")
            .gated_terminal("a", ".a", "nope")
            .build()
            .is_err());
        assert!(Composite::builder(".")
            .composite("sub", Composite::builder(".").terminal("x", "").build())
            .build()
            .is_err());
    }

    #[test]
    fn test_gate_is_kept() {
        let dir = Composite::builder(".")
            .gated_terminal("spot", ".spot.termination_time", ".spot")
            .build()
            .unwrap();
        let child = dir.child("spot").unwrap();
        assert_eq!(child.gate().map(ToString::to_string), Some(".spot".to_string()));
    }
}
