pub mod connection;
pub mod endpoint;

pub use connection::{ConnectionString, Fabric, parse_host_port};
pub use endpoint::{DEFAULT_BUFFER_SIZE, DEFAULT_REQUEST_TIMEOUT, Endpoint};
