pub mod analyzer;
pub mod chat;
pub mod packet_dump;
pub mod survey;
#[cfg(test)]
mod testing;

pub use analyzer::*;
