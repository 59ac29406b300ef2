//! Hegel Metadata - query resolution engine
//!
//! Maps EC2-style metadata paths onto a declarative filter tree and
//! evaluates the resulting queries against machine records:
//!
//! - [`query`]: the small jq-like expression language records are filtered with.
//! - [`filter`]: the tagged filter tree, validated when it is built.
//! - [`ec2`]: the `/2009-04-04` tree served to instances.
//! - [`resolve`]: path to query (or directory listing) resolution.
//! - [`execute`]: query evaluation and response rendering.
//! - [`export`]: the fixed projection served in legacy mode.

pub mod ec2;
pub mod execute;
pub mod export;
pub mod filter;
pub mod query;
pub mod resolve;

pub use ec2::{EC2_VERSION_PREFIX, ec2_tree, relative_path};
pub use execute::{execute, render_listing, render_values, run_query};
pub use export::export_hardware;
pub use filter::{Child, Composite, FilterNode, RESERVED_BASE_KEY};
pub use query::Query;
pub use resolve::{Resolved, resolve};
