//! Encrypted local storage for threat events and on-device training samples.

mod encrypted;

pub use encrypted::SecureStore;
