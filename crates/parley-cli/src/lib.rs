//! Terminal client for Parley
//!
//! A thin shell over [`parley_app::Driver`] for a line-oriented terminal:
//! typed lines become intents, and each rendered view is printed as the
//! lines that changed. All orchestration lives in the generic
//! [`parley_app::Runtime`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod history;
pub mod input;
pub mod render;
pub mod system_env;
pub mod terminal;

pub use history::HistoryStub;
pub use input::{spawn_line_reader, spawn_stdin_reader};
pub use render::{ExpectedIdentity, LineRenderer, format_message};
pub use system_env::SystemEnv;
pub use terminal::{DEFAULT_TICK, TerminalDriver, TerminalError};
