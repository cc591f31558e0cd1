#[cfg(test)]
#[macro_use] extern crate hex_literal;

mod config;
mod util;
mod crypto;

pub use config::*;
pub use util::*;
pub use crypto::*;
