// src/services/mod.rs

pub mod scoring;
pub mod selection;
