//! contents-autouploader library crate.
//!
//! Turns a topic and storyline into a narrated slide video: script
//! generation, slide rendering, speech synthesis, timing, encoding and
//! YouTube upload. Each stage is usable on its own; [`workflow`] chains them.

pub mod ai;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod models;
pub mod retry;
pub mod script;
pub mod slides;
pub mod sync;
pub mod tts;
pub mod util;
pub mod video;
pub mod workflow;
pub mod youtube;

pub use error::{Error, Result};
