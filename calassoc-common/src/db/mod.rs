//! Database schema, migrations and record mapping

pub mod init;
pub mod migrations;
pub mod models;
pub mod observations;

pub use init::*;
pub use migrations::*;
pub use models::*;
pub use observations::*;
