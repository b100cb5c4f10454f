pub mod client;
pub mod response;

pub use client::{OaiClient, format_datestamp};
pub use response::{Header, MetadataFormat, OaiResponse};
