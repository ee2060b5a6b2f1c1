pub mod cli;
pub mod config;
pub mod database;
pub mod http;
pub mod models;
pub mod utils;

pub use config::Config;
pub use database::Database;
pub use models::{Priority, Task};
pub use utils::Profile;
