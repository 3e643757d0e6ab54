//! Deoptimization causes reported by failing guards

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a speculative fast path bailed out.
///
/// The `Display` form is the name printed in `Check Type: <name>` traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeoptType {
    NotCallTarget1,
    NotHeapObject1,
    BuiltinInstanceHClassMismatch,
    BuiltinInstanceHClassMismatch2,
    NotStableArray1,
    NotStableArray2,
    IsNotWritableLength,
    LengthOverflow,
    NotNumber1,
    NotInt1,
    NotString1,
    NotFlatString1,
    NotBigInt,
    IndexNotInt,
    IndexLessZero,
    ArrayBufferIsDetached,
    TotalSizeOverflow,
    RangeError,
    NotPrimitive1,
    ArgCountMismatch,
}

impl DeoptType {
    pub const ALL: &'static [DeoptType] = &[
        DeoptType::NotCallTarget1,
        DeoptType::NotHeapObject1,
        DeoptType::BuiltinInstanceHClassMismatch,
        DeoptType::BuiltinInstanceHClassMismatch2,
        DeoptType::NotStableArray1,
        DeoptType::NotStableArray2,
        DeoptType::IsNotWritableLength,
        DeoptType::LengthOverflow,
        DeoptType::NotNumber1,
        DeoptType::NotInt1,
        DeoptType::NotString1,
        DeoptType::NotFlatString1,
        DeoptType::NotBigInt,
        DeoptType::IndexNotInt,
        DeoptType::IndexLessZero,
        DeoptType::ArrayBufferIsDetached,
        DeoptType::TotalSizeOverflow,
        DeoptType::RangeError,
        DeoptType::NotPrimitive1,
        DeoptType::ArgCountMismatch,
    ];

    /// Causes that signal a change in the heap rather than in operand types
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            DeoptType::NotCallTarget1
                | DeoptType::BuiltinInstanceHClassMismatch2
                | DeoptType::NotStableArray1
                | DeoptType::ArrayBufferIsDetached
        )
    }
}

impl fmt::Display for DeoptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
