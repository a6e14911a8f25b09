//! Document processors: line segmentation, PDF pages and file export

pub mod export;
pub mod lines;
pub mod pages;
pub mod pdf;
