pub mod consumer;
pub mod player;
pub mod producer;
pub mod ring_buffer;
pub mod sink;
pub mod source;
