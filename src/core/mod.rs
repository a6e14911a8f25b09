//! Core translation engine module

pub mod beam;
pub mod config;
pub mod engine;
pub mod errors;
pub mod hub;
pub mod models;
pub mod onnx;
pub mod session;
