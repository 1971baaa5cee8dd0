#![allow(dead_code)]

//! Capture engine: external camera subprocess chain, raw-stream framing,
//! detector boundary, and JPEG encoding.

pub mod decoder;
pub mod detect;
pub mod encode;
pub mod error;
pub mod frame;
pub mod source;
