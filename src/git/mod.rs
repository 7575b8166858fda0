//! Git repository access for the commit flow.

pub mod inspector;

pub use inspector::{GitInspector, GitOps};
