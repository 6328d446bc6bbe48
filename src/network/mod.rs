pub mod server;
pub mod tcp;
pub mod wav;
