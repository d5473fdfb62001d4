pub mod client;
pub mod multipart;
pub mod pending;
pub mod transport;

pub use self::client::{ApiClient, AuthEvent};
pub use self::multipart::{MultipartBody, encode_record};
pub use self::pending::PendingCounter;
pub use self::transport::{HyperTransport, Transport, TransportError, TransportFuture};
