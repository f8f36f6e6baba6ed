//! App-facing facade over the admin session

pub mod admin;

pub use admin::{HeliographAdmin, ReadRegistrar, WriteRegistrar};
