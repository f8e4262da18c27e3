//! External data acquisition.

pub mod provider;
