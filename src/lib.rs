pub mod channels;
pub mod core;
pub mod tickets;
