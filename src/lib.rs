pub use hex::*;
pub mod hex;
