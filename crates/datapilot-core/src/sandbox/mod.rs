//! Stateful Python execution for one session.
//!
//! A dedicated OS thread owns the interpreter and a persistent scope; the
//! async side talks to it over a command channel. Everything observable from
//! a fragment (stdout, errors, figures) comes back as data — in-fragment
//! failures never surface as `Err`.

pub mod figure;
mod shim;
mod worker;

pub use figure::{FigureSpec, RenderedFigure, SeriesSpec};
pub use worker::{BindingSpec, SandboxHandle};

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to start execution context: {0}")]
    Startup(String),

    #[error("failed to initialize execution context: {0}")]
    Init(String),

    #[error("execution context is gone: {0}")]
    ContextLost(String),
}

/// Everything observable from one executed fragment.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub error: Option<String>,
    pub figures: Vec<RenderedFigure>,
    pub success: bool,
    pub duration: Duration,
}
