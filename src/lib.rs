pub mod config;
pub mod db;
pub mod error;
pub mod util;

pub use config::Config;
pub use db::{Database, WishlistStore};
pub use error::DataError;
