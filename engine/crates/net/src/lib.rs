pub mod connection;
pub mod rate_limiter;
pub mod server;
pub mod telnet;

pub use connection::{Connection, LineReader};
pub use rate_limiter::{ConnectionLimiter, ConnectionPermit, RateLimitConfig, RateLimitRejection};
pub use server::run_tcp_server_with_shutdown;
pub use telnet::{LineBuffer, DEFAULT_MAX_LINE_LEN};
