use thiserror::Error;

use crate::ir::{BlockId, InstrId};

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvariantViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvariantViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

pub(crate) use invariant_error;

/// The generic Error type, covering every error this library can return.
///
/// Errors here are *contract violations*: a pass was handed a graph whose
/// def-use lists, dominance data or block structure are inconsistent, or the
/// pipeline was configured in an impossible way. An optimization that simply
/// does not apply to a method is never an error; passes report that through
/// their return values instead.
///
/// # Error Categories
///
/// ## Graph Invariant Errors
/// - [`Error::InvariantViolation`] - Def-use, SSA or structural inconsistency
/// - [`Error::StaleAnalysis`] - Derived data consumed after a structural edit
/// - [`Error::InvalidBlock`] - Reference to a removed or unknown block
/// - [`Error::InvalidInstruction`] - Reference to a removed or unknown instruction
/// - [`Error::HeapLocationOverflow`] - Heap location index outside the collected set
///
/// ## Configuration Errors
/// - [`Error::UnknownPass`] - Pass name not present in the registry
/// - [`Error::PassOrdering`] - Pass listed before a pass it depends on
///
/// # Examples
///
/// ```rust
/// use optigraph::{Error, ir::Graph};
///
/// let graph = Graph::new("empty");
/// match graph.verify() {
///     Ok(()) => println!("graph is consistent"),
///     Err(Error::InvariantViolation { message, file, line }) => {
///         eprintln!("broken graph: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A graph invariant does not hold.
    ///
    /// Raised by [`crate::ir::Graph::verify`] and by mutation helpers that
    /// detect inconsistent input. The error includes the source location where
    /// the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the violated invariant
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Invariant violation - {file}:{line}: {message}")]
    InvariantViolation {
        /// The message to be printed for the violation
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Dominance, loop or ordering information was requested while stale.
    ///
    /// Structural edits mark the derived data stale; callers must rebuild it
    /// with [`crate::ir::Graph::rebuild_analyses`] before consuming it.
    #[error("Derived graph analyses are stale and must be rebuilt")]
    StaleAnalysis,

    /// A block id does not name a live block.
    #[error("Invalid block - {0}")]
    InvalidBlock(BlockId),

    /// An instruction id does not name a live instruction.
    #[error("Invalid instruction - {0}")]
    InvalidInstruction(InstrId),

    /// A heap location index exceeds the number of collected locations.
    #[error("Heap location {index} out of range ({count} locations collected)")]
    HeapLocationOverflow {
        /// The requested index
        index: usize,
        /// The number of collected heap locations
        count: usize,
    },

    /// A pass name is not known to the pass registry.
    #[error("Unknown optimization pass - {0}")]
    UnknownPass(String),

    /// A pass was scheduled before one it depends on.
    #[error("Pass '{pass}' must run after '{requires}'")]
    PassOrdering {
        /// The pass that was scheduled too early
        pass: String,
        /// The pass it depends on
        requires: String,
    },
}
