pub mod expiring;

pub use expiring::{Expirable, ExpiringStore, RemovalCause, RemovalListener};
