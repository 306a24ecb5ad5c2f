//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`RhiError`] covers every failure mode of the integration layer:
//! - GPU resource creation failures reported by the device
//! - Missing resources on the provider side (shaders, textures, meshes)
//! - Binding generation for unsupported renderer/option combinations
//! - Render graph construction
//! - Shader stub rendering and validation
//!
//! # Usage
//!
//! All fallible APIs return [`Result<T>`] which is an alias for `std::result::Result<T, RhiError>`.
//!
//! ```rust,ignore
//! use particle_rhi::errors::{RhiError, Result};
//!
//! fn bake() -> Result<()> {
//!     // Operations that may fail return Result
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the particle RHI layer.
///
/// Each variant carries enough context to identify the failing resource in a
/// log line; callers decide whether to abort (pipeline setup) or substitute a
/// default resource (per-draw textures and geometry).
#[derive(Error, Debug)]
pub enum RhiError {
    // ========================================================================
    // Device & Resource Creation Errors
    // ========================================================================
    /// The device refused to create a resource.
    #[error("Failed to create {kind} '{name}': {reason}")]
    CreationFailed {
        /// Resource kind (buffer, texture, render state, ...)
        kind: &'static str,
        /// Debug name of the resource
        name: String,
        /// Driver or backend message
        reason: String,
    },

    /// The resource provider has no data for this path.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// A dependency has not been built yet.
    #[error("Resource not ready: {0}")]
    NotReady(String),

    /// A handle no longer refers to a live cache entry.
    #[error("Stale {0} handle")]
    StaleHandle(&'static str),

    // ========================================================================
    // Binding Generation Errors
    // ========================================================================
    /// The renderer class has no RHI rendering path.
    #[error("Unsupported renderer class: {0}")]
    UnsupportedRenderer(&'static str),

    /// The shader option combination cannot be expressed for this renderer.
    #[error("Unsupported shader combination: {0}")]
    UnsupportedCombination(String),

    /// A declared field or property cannot be bound.
    #[error("Invalid field: {0}")]
    InvalidField(String),

    // ========================================================================
    // Render Graph Errors
    // ========================================================================
    /// No swap-chain render target was provided.
    #[error("No swap-chain render target provided")]
    MissingSwapChain,

    /// Render graph construction failed.
    #[error("Render graph error: {0}")]
    RenderGraph(String),

    /// The particle pass is not part of the current pipeline.
    #[error("Particle pass not available: {0}")]
    PassNotAvailable(&'static str),

    // ========================================================================
    // Shader Stub Errors
    // ========================================================================
    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// A stub declaration disagrees with the binding layout.
    #[error("Stub mismatch in {stage} stage at line {line}: expected `{expected}`, found `{found}`")]
    StubMismatch {
        /// Shader stage name
        stage: &'static str,
        /// 1-based line in the stub
        line: usize,
        /// Declaration derived from the bindings
        expected: String,
        /// Declaration read from the stub
        found: String,
    },

    // ========================================================================
    // Configuration & I/O Errors
    // ========================================================================
    /// JSON parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RhiError {
    /// Shorthand for [`RhiError::CreationFailed`].
    pub fn creation(kind: &'static str, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Alias for `Result<T, RhiError>`.
pub type Result<T> = std::result::Result<T, RhiError>;
