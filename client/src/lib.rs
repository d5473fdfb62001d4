pub mod app;
pub mod booking;
pub mod dashboard;
pub mod error;
pub mod gateway;
pub mod records;
pub mod routes;
pub mod session;

pub use self::app::App;
pub use self::error::{ClientError, ClientResult, Field, FieldErrors};
