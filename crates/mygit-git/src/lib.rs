//! # mygit-git
//!
//! The wire side of mygit: pkt-line framing, pack file decoding (including
//! REF_DELTA resolution), and the smart HTTP clone driver.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod clone;
pub mod delta;
mod error;
mod pack;
mod pktline;

pub use clone::clone;
pub use error::{GitError, Result};
pub use pack::PackParser;
pub use pktline::{PktLine, PktLineReader};
