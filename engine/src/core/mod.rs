//! Core value types shared by every pipeline stage

pub mod money;
pub mod window;
