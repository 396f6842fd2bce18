//! These models represent the objects passed between the application, the
//! router, and the provider adapters.
//!
//! The internal shapes are deliberately provider-neutral: adapters translate
//! them to and from each vendor's wire format, so none of these types match
//! any vendor API exactly.
pub mod message;
pub mod tool;
