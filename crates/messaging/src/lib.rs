//! healio-messaging — encrypted conversation synchronization for Healio.
//!
//! Binds one conversation at a time to a realtime document store, decrypts
//! every snapshot the store pushes into a UI-ready message list, and encrypts
//! outgoing messages before they are appended.

pub mod author;
pub mod config;
pub mod error;
pub mod feed;
pub mod mapping;
pub mod store;
