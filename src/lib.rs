pub mod cache;
pub mod command;
pub mod error;
pub mod protocol;
pub mod resultset;
pub mod serialize;

pub use cache::{CacheClient, CacheCommand, CacheDuration};
pub use command::{DatabaseCommand, DatabaseResponse, ParameterValue, SqlCommand, SqlParameter};
pub use error::ClientError;
pub use protocol::{Connection, ConnectionState, ResponseFormat};
pub use resultset::{ResultSet, Value};
pub use serialize::TypeRegistry;
