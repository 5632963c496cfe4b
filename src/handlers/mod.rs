// src/handlers/mod.rs

pub mod question_bank;
pub mod revision_quiz;
