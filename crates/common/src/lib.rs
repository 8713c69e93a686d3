// marginalia-common: shared types for the Marginalia workspace

pub mod content;
pub mod protocol;
pub mod types;
