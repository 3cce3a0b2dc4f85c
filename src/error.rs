use thiserror::Error;

use crate::analysis::LoopId;
use crate::utils::graph::NodeId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Builds an [`Error::Invariant`](crate::Error::Invariant) after failing a
/// `debug_assert!` with the same message.
///
/// Debug builds stop at the assertion; release builds return the error so the
/// pass aborts without touching the function any further.
macro_rules! invariant_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{
        let message = format!($fmt $(, $arg)*);
        debug_assert!(false, "{}", message);
        crate::Error::Invariant {
            message,
            file: file!(),
            line: line!(),
        }
    }};
}

/// The generic Error type, which provides coverage for all errors this library
/// can return.
///
/// Negative fusion outcomes (a loop that is not eligible, a pair that is not
/// legal to fuse) are *not* errors; they are reported as
/// [`FusionReason`](crate::compiler::FusionReason) values. An `Error` means the
/// input IR was malformed, or the transformer broke one of its own invariants.
///
/// # Error Categories
///
/// ## IR Errors
/// - [`Error::Malformed`] - Inconsistent IR handed to the builder or a mutation
/// - [`Error::InvalidBlock`] - Reference to a block that does not exist or was erased
/// - [`Error::InvalidLoop`] - Reference to an unknown or erased loop
///
/// ## Transformer Errors
/// - [`Error::Invariant`] - A structural invariant did not hold after a transform
/// - [`Error::Verification`] - An explicit verifier rejected the function or an analysis
///
/// # Examples
///
/// ```rust
/// use loopfuse::{analysis::FunctionBuilder, Error};
///
/// let result = FunctionBuilder::new("f").build_with(|f| {
///     f.block(0, |b| b.jump(7));
/// });
/// match result {
///     Err(Error::InvalidBlock(block)) => assert_eq!(block.index(), 7),
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The IR is structurally inconsistent.
    ///
    /// Raised for missing terminators, terminators in the middle of a block,
    /// duplicate definitions and similar construction mistakes. The error
    /// carries the source location where the problem was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// Description of the inconsistency
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A block reference points outside the function or at an erased block.
    #[error("Invalid block reference - {0}")]
    InvalidBlock(NodeId),

    /// A loop id is unknown to the loop forest, or the loop was erased.
    #[error("Invalid loop reference - {0}")]
    InvalidLoop(LoopId),

    /// A transformer invariant was violated.
    ///
    /// This indicates a bug in the fusion engine rather than a property of the
    /// input. In debug builds the violation asserts before this error is built.
    #[error("Invariant violated - {file}:{line}: {message}")]
    Invariant {
        /// Description of the violated invariant
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A verifier found the function or one of its analyses inconsistent.
    #[error("Verification failed: {0}")]
    Verification(String),
}
