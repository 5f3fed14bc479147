pub mod encrypted_mnemonic;
pub mod errors;
pub mod events;
pub mod keys;
pub mod network;
