pub mod generate;
pub mod health;
pub mod key_status;
