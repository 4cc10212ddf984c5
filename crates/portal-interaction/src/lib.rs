//! Remote I/O for the employee portal: the REST backend client.

pub mod dto;
pub mod http_client;

pub use http_client::HttpPortalClient;
