//! # recordsift
//!
//! A multi-tenant service for uploading CSV and PDF files into named
//! datasets, searching them with regular expressions, and asking questions
//! about them through an external question-answering model.
//!
//! The pure logic (validators, search and ranking, context building, the
//! [`Store`](recordsift_core::store::Store) trait) lives in
//! `recordsift-core`; this crate adds SQLite persistence, file parsing, the
//! inference client, authentication, and the HTTP surface.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │   Upload    │──▶│   Ingest    │──▶│  SQLite  │
//! │  CSV / PDF  │   │ parse+check │   │  store   │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │  Search  │       │  Query   │──▶ inference API
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! recordsift init                       # create database
//! recordsift serve                      # start HTTP server
//! recordsift search --user 1 "invoice"  # search from the shell
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `Store` implementation |
//! | [`extract`] | CSV and PDF parsing |
//! | [`ingest`] | Upload pipeline |
//! | [`inference`] | Question-answering client |
//! | [`query`] | Question pipeline |
//! | [`auth`] | Passwords, accounts, tokens |
//! | [`datasets`] | Dataset and record listings |
//! | [`search`] | Operator search and listing commands |
//! | [`server`] | HTTP server |

pub mod auth;
pub mod config;
pub mod datasets;
pub mod db;
pub mod extract;
pub mod inference;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod query;
pub mod search;
pub mod server;
pub mod sqlite_store;
