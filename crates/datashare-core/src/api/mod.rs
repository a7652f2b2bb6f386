//! Request dispatch for the Datashare platform API.
//!
//! Every endpoint speaks the same envelope: `{ success, message, data,
//! timestamp }`, or a raw byte stream for downloads. The dispatcher attaches
//! the current access credential to each call and coordinates with the
//! refresh machinery when a credential is rejected.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod transport;

pub use client::AdminClient;
pub use dispatcher::{Dispatcher, Envelope};
pub use error::ApiError;
pub use transport::{ApiRequest, HttpTransport, Method, RawResponse, Transport};
