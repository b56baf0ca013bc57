//! `sur`: load sublets outside the window manager and poke at them.

pub mod cli;
pub mod harness;
pub mod logging;
