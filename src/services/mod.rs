pub mod hashing;
pub mod jwt;
pub mod metrics;
pub mod notification;
pub mod protector;
pub mod reminder;
pub mod session;
pub mod token;
