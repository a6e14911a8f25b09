//! Web interface

pub mod api;
