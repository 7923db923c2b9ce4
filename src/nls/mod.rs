//! Alibaba Cloud NLS real-time speech recognition backend

pub mod client;
pub mod messages;
mod task;
pub mod token;

pub use client::{NlsClient, NlsConnector};
pub use messages::{NlsRequest, NlsResponse};
pub use task::{NlsTask, CONNECTION_LOST};
pub use token::{create_token, AccessToken};
