//! Rewrites `src`/`href` asset references in HTML so they point at static
//! CDN hostnames instead of the page's own domain.
//!
//! The pipeline has three stages: [`resolve_base_path`] runs once per
//! document, [`Scanner`] locates candidate attributes, and a
//! [`RewriteSession`] resolves each match against the base path and assigns
//! it a static domain — either a fixed label from the extension table or a
//! cyclically numbered bucket.

mod base_path;
mod config;
mod normalize;
mod scan;
mod session;

pub use base_path::{resolve_base_path, BasePath};
pub use config::{DomainAssignment, RewriteConfig};
pub use normalize::normalize;
pub use scan::{AttributeMatch, AttributeName, Scanner};
pub use session::RewriteSession;
