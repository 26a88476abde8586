//! Render graph compiler error types.

use thiserror::Error;

use crate::compiler::AliasingGroup;
use crate::graph::PassHandle;

/// Errors that abort a graph build or compilation.
///
/// Every variant is a violated precondition of the planning step that raised
/// it. None of them is retried and no partial plan is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Pass dependencies form a cycle, so no schedule exists.
    #[error("render graph contains a dependency cycle through pass '{pass}'")]
    GraphCycle { pass: String },

    /// Two passes declared a write to the same subresource.
    #[error(
        "subresource {subresource} of '{resource}' is written by both '{first_writer}' and '{second_writer}'"
    )]
    DuplicateWrite {
        resource: String,
        subresource: u32,
        first_writer: String,
        second_writer: String,
    },

    /// A pass handle that this builder did not create.
    #[error("unknown pass handle {handle:?}")]
    UnknownPass { handle: PassHandle },

    /// A resource name that no pass has declared a dependency on.
    #[error("unknown resource '{resource}'")]
    UnknownResource { resource: String },

    /// A state request for a resource the pass never reads or writes.
    #[error("pass '{pass}' requests a state for '{resource}' without declaring a dependency on it")]
    UndeclaredResourceUsage { pass: String, resource: String },

    /// An allocation does not fit the configured heap limit.
    #[error(
        "allocation of '{resource}' ({size} bytes) overflows the {group} heap: {required} bytes required, limit is {limit}"
    )]
    AllocationOverflow {
        resource: String,
        group: AliasingGroup,
        size: u64,
        required: u64,
        limit: u64,
    },
}

/// Result alias for compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;
