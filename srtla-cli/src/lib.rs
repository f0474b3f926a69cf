//! SRTLA CLI Tools
//!
//! Shared configuration support for the command line tools.

pub mod config;
