pub mod chain;

pub use chain::{advance, derive_label, ChainSecret, Psk, SECRET_SIZE};
