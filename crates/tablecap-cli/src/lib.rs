//! Tablecap command-line front end: target files, the Chromium adapter,
//! offline snapshot replay, and output rendering.

pub mod browser;
pub mod config;
pub mod doctor;
pub mod output;
pub mod replay;
pub mod runner;
