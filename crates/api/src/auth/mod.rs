//! Authentication for the socket boundary
//!
//! Token issuance lives in the account service; this server only validates.

pub mod jwt;

pub use jwt::{Claims, JwtManager};
