#![forbid(unsafe_code)]

//! Video-sharing API: accounts, channels, videos and comments over an
//! embedded libsql database.

pub mod access;
pub mod accounts;
pub mod auth;
pub mod channels;
pub mod comments;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod store;
pub mod videos;

#[cfg(test)]
pub(crate) mod test_support;
