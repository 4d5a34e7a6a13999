pub mod config;
pub mod review;
pub mod store;

pub use review::Review;
pub use store::{ReviewStore, StoreError};
