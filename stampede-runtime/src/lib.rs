//! Operator control surface: CLI flags, HTTP endpoints and a stdin `stop` command, all driving a
//! [`Control`] implementation.
pub mod runtime;

mod error;
mod input;
mod server;
pub mod traits;

pub use crate::error::RuntimeError;
pub use crate::runtime::StampedeRuntime;
pub use crate::server::RunStarted;
pub use crate::traits::Control;
