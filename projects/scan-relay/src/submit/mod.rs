pub mod client;
pub mod quantity;
