pub mod conditioner;
pub mod config;
pub mod draft;
pub mod heuristics;
pub mod ocr;
pub mod scan;
