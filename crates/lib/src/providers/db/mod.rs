pub mod durable;
pub mod sqlite;
