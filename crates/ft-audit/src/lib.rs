#![forbid(unsafe_code)]

pub mod log;
pub mod wrapper;

pub use log::OpLog;
pub use wrapper::{CheckedTensor, TensorMeta, TrackedValue, unwrap_tree, wrap_tree};

use ft_core::{ArgValue, ValueError, deep_clone, flatten_tensors};
use ft_kernels::{KernelError, KernelRegistry};
use ft_schema::{SchemaError, SchemaRegistry, canonical_name, normalize};
use std::collections::BTreeMap;

/// The dispatcher's view of one operand class. Passed through the entry
/// point for parity with the dispatch protocol; the audit pipeline records
/// it and never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Checked,
    Plain,
}

impl OperandKind {
    #[must_use]
    pub fn of(value: &TrackedValue) -> Self {
        if value.contains_checked() {
            Self::Checked
        } else {
            Self::Plain
        }
    }
}

/// Build the operand-kind descriptor for a positional argument list.
#[must_use]
pub fn operand_kinds(args: &[TrackedValue]) -> Vec<OperandKind> {
    args.iter().map(OperandKind::of).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// An argument not declared mutable was observed to differ in value
    /// before vs. after execution.
    MutatedImmutableArgument { argument: String },
    Schema(SchemaError),
    Kernel(KernelError),
    Value(ValueError),
}

impl std::fmt::Display for AuditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MutatedImmutableArgument { argument } => {
                write!(
                    f,
                    "argument {argument} is not defined as mutable but was mutated"
                )
            }
            Self::Schema(err) => write!(f, "schema error: {err}"),
            Self::Kernel(err) => write!(f, "kernel error: {err}"),
            Self::Value(err) => write!(f, "value error: {err}"),
        }
    }
}

impl std::error::Error for AuditError {}

impl From<SchemaError> for AuditError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<KernelError> for AuditError {
    fn from(value: KernelError) -> Self {
        Self::Kernel(value)
    }
}

impl From<ValueError> for AuditError {
    fn from(value: ValueError) -> Self {
        Self::Value(value)
    }
}

/// Owns one verification run: the schema and kernel registries plus the
/// operation log. Every dispatch runs the full intercept pipeline to
/// completion before returning; there is no partial-success state.
#[derive(Debug, Clone)]
pub struct AuditSession {
    schemas: SchemaRegistry,
    kernels: KernelRegistry,
    log: OpLog,
}

impl AuditSession {
    #[must_use]
    pub fn new(schemas: SchemaRegistry, kernels: KernelRegistry) -> Self {
        Self {
            schemas,
            kernels,
            log: OpLog::new(),
        }
    }

    /// Session over the bundled schema and kernel sets.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(SchemaRegistry::builtin(), KernelRegistry::builtin())
    }

    #[must_use]
    pub fn log(&self) -> &OpLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut OpLog {
        &mut self.log
    }

    pub fn schemas_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.schemas
    }

    pub fn kernels_mut(&mut self) -> &mut KernelRegistry {
        &mut self.kernels
    }

    /// The interception hook: record, unwrap, normalize, clone, execute,
    /// audit, wrap — a strict linear pipeline with no branching back.
    pub fn dispatch(
        &mut self,
        operation: &str,
        _types: &[OperandKind],
        args: &[TrackedValue],
        kwargs: &BTreeMap<String, TrackedValue>,
    ) -> Result<TrackedValue, AuditError> {
        // Record first: the log reflects attempted invocations, not only
        // successful ones.
        self.log.append(operation);

        let unwrapped_args: Vec<ArgValue> = args.iter().map(unwrap_tree).collect();
        let unwrapped_kwargs: BTreeMap<String, ArgValue> = kwargs
            .iter()
            .map(|(key, value)| (key.clone(), unwrap_tree(value)))
            .collect();

        // Mutability contracts are declared per named argument, so the call
        // is normalized to keyword-only bindings before anything executes.
        let schema = self.schemas.lookup(operation)?;
        let bindings = normalize(schema, &unwrapped_args, &unwrapped_kwargs)?;

        // Pre-execution snapshots. The clones exist purely for post-hoc
        // comparison; execution sees the original arguments.
        let snapshots: BTreeMap<String, ArgValue> = bindings
            .iter()
            .map(|(name, value)| (name.clone(), deep_clone(value)))
            .collect();

        let kernel = self.kernels.lookup(operation)?;
        let output = kernel(&unwrapped_args, &unwrapped_kwargs)?;

        // The declared argument list drives the audit; an argument the call
        // never bound has no clone pair and is skipped.
        for spec in &schema.args {
            if spec.mutable {
                continue;
            }
            let name = canonical_name(&spec.name);
            let (Some(bound), Some(snapshot)) = (bindings.get(name), snapshots.get(name)) else {
                continue;
            };
            if leaves_diverge(bound, snapshot) {
                return Err(AuditError::MutatedImmutableArgument {
                    argument: name.to_owned(),
                });
            }
        }

        Ok(wrap_tree(output)?)
    }
}

/// Leaf-wise exact comparison of a bound (post-execution) value against its
/// pre-execution snapshot. A diverging leaf count also counts as mutation.
fn leaves_diverge(bound: &ArgValue, snapshot: &ArgValue) -> bool {
    let after = flatten_tensors(bound);
    let before = flatten_tensors(snapshot);
    after.len() != before.len()
        || after
            .iter()
            .zip(before.iter())
            .any(|(post, pre)| !post.value_eq(pre))
}
