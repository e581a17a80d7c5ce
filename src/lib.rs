//! Tilecast - tile-based transcoding host
//!
//! This library crate exposes the host-side file formats and configuration
//! for integration testing.

pub mod config;
pub mod inspect;
pub mod stream;
pub mod yuv;
