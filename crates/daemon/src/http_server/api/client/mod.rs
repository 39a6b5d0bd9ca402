pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;

use reqwest::{Client, RequestBuilder};
use url::Url;

/// One peer protocol operation, from the caller's side: knows how to build
/// its own HTTP request against a base URL. Implemented next to the handler
/// that serves it.
pub trait ApiRequest: Send {
    type Response: serde::de::DeserializeOwned + Send;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder;
}
