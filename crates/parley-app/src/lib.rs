//! Application layer for Parley
//!
//! Generic runtime that connects the Sans-IO [`parley_client::Client`] to a
//! platform's I/O, so deterministic simulation runs the same orchestration
//! code as production.
//!
//! # Components
//!
//! - [`Driver`]: Trait for platform-specific I/O (transport, history, input,
//!   rendering)
//! - [`Runtime`]: Orchestration loop executing client actions via a driver
//! - [`Intent`]: User intents, with a parser for line-based input
//! - [`ChatView`]: Render snapshot rebuilt after every state change

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod error;
mod intent;
mod runtime;
mod view;

pub use driver::Driver;
pub use error::RuntimeError;
pub use intent::{Intent, ParseError};
pub use runtime::Runtime;
pub use view::ChatView;
