#![forbid(unsafe_code)]

mod arithmetic;
mod inplace;
mod reduction;

use ft_core::{ArgValue, Shape, ValueError};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    UnknownOperation {
        operation: String,
    },
    ArityMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },
    TypeMismatch {
        operation: &'static str,
        detail: &'static str,
    },
    ShapeMismatch {
        operation: &'static str,
        left: Shape,
        right: Shape,
    },
    DuplicateParameter {
        operation: &'static str,
        parameter: &'static str,
    },
    InvalidTensor(ValueError),
}

impl std::fmt::Display for KernelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOperation { operation } => {
                write!(f, "no kernel registered for operation {operation}")
            }
            Self::ArityMismatch {
                operation,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "arity mismatch for {}: expected {}, got {}",
                    operation, expected, actual
                )
            }
            Self::TypeMismatch { operation, detail } => {
                write!(f, "type mismatch for {operation}: {detail}")
            }
            Self::ShapeMismatch {
                operation,
                left,
                right,
            } => {
                write!(
                    f,
                    "shape mismatch for {}: left={:?} right={:?}",
                    operation, left.dims, right.dims
                )
            }
            Self::DuplicateParameter {
                operation,
                parameter,
            } => {
                write!(
                    f,
                    "{} received parameter {} both positionally and by keyword",
                    operation, parameter
                )
            }
            Self::InvalidTensor(err) => write!(f, "invalid tensor: {err}"),
        }
    }
}

impl std::error::Error for KernelError {}

impl From<ValueError> for KernelError {
    fn from(value: ValueError) -> Self {
        Self::InvalidTensor(value)
    }
}

/// A kernel receives the call exactly as the dispatcher saw it: unwrapped
/// positional arguments plus unwrapped keyword arguments.
pub type KernelFn =
    fn(&[ArgValue], &BTreeMap<String, ArgValue>) -> Result<ArgValue, KernelError>;

/// Central kernel dispatch table, keyed by operation identifier.
///
/// [`KernelRegistry::builtin`] carries the bundled engine; `register` lets a
/// harness extend or override entries, including with kernels that
/// deliberately violate their declared contract.
#[derive(Debug, Clone)]
pub struct KernelRegistry {
    table: FxHashMap<String, KernelFn>,
}

impl KernelRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            table: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("add", arithmetic::add);
        registry.register("sub", arithmetic::sub);
        registry.register("mul", arithmetic::mul);
        registry.register("neg", arithmetic::neg);
        registry.register("abs", arithmetic::abs);
        registry.register("sum", reduction::sum);
        registry.register("add_", inplace::add_);
        registry.register("mul_", inplace::mul_);
        registry.register("relu_", inplace::relu_);
        registry.register("zero_", inplace::zero_);
        registry
    }

    pub fn register(&mut self, operation: impl Into<String>, kernel: KernelFn) {
        self.table.insert(operation.into(), kernel);
    }

    pub fn lookup(&self, operation: &str) -> Result<KernelFn, KernelError> {
        self.table
            .get(operation)
            .copied()
            .ok_or_else(|| KernelError::UnknownOperation {
                operation: operation.to_owned(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
