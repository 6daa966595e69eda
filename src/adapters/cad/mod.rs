//! CAD API client adapters.

mod http;
mod mock;

pub use http::HttpCadClient;
pub use mock::MockCadClient;
