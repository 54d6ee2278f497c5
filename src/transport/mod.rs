mod http_transport;

pub use http_transport::{chat_completions_url, HttpTransport};
