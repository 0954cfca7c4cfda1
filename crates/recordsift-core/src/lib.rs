//! # recordsift core
//!
//! Runtime-free logic for recordsift: data models, input validators, the
//! store abstraction, the pattern search engine, and the question-context
//! builder.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! The service crate supplies the SQLite store, file parsing, and the HTTP
//! surface; everything here operates on plain values or through the
//! [`store::Store`] trait.

pub mod context;
pub mod models;
pub mod search;
pub mod store;
pub mod validate;
