#![forbid(unsafe_code)]

use ft_core::ArgValue;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolve an argument's canonical binding name. The conventional
/// self-receiver is bound as `input`; every other name is already
/// canonical.
#[must_use]
pub fn canonical_name(name: &str) -> &str {
    if name == "self" { "input" } else { name }
}

/// One formal parameter of an operation: its declared name, whether the
/// operation is permitted to mutate it in place, and whether a call must
/// bind it. The mutability flag is fixed at registration and never touched
/// by the audit layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    pub mutable: bool,
    pub required: bool,
}

impl ArgSpec {
    #[must_use]
    pub fn required(name: impl Into<String>, mutable: bool) -> Self {
        Self {
            name: name.into(),
            mutable,
            required: true,
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, mutable: bool) -> Self {
        Self {
            name: name.into(),
            mutable,
            required: false,
        }
    }
}

/// Declared signature of one operation: name plus formal parameters in
/// positional order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpSchema {
    pub name: String,
    pub args: Vec<ArgSpec>,
}

impl OpSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<ArgSpec>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    UnknownOperation {
        operation: String,
    },
    PositionalOverflow {
        operation: String,
        declared: usize,
        received: usize,
    },
    UnknownKeyword {
        operation: String,
        keyword: String,
    },
    DuplicateBinding {
        operation: String,
        argument: String,
    },
    MissingRequiredArgument {
        operation: String,
        argument: String,
    },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOperation { operation } => {
                write!(f, "no schema registered for operation {operation}")
            }
            Self::PositionalOverflow {
                operation,
                declared,
                received,
            } => {
                write!(
                    f,
                    "{} declares {} arguments but received {} positionally",
                    operation, declared, received
                )
            }
            Self::UnknownKeyword { operation, keyword } => {
                write!(f, "{operation} has no argument named {keyword}")
            }
            Self::DuplicateBinding {
                operation,
                argument,
            } => {
                write!(
                    f,
                    "argument {} of {} bound both positionally and by keyword",
                    argument, operation
                )
            }
            Self::MissingRequiredArgument {
                operation,
                argument,
            } => {
                write!(f, "{operation} requires argument {argument}")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// Map a call onto the schema's declared argument list, producing a
/// keyword-only binding keyed by canonical names. Positional values bind in
/// declared order; keyword values bind by declared or canonical name.
/// Omitted optional arguments are simply absent from the result.
pub fn normalize(
    schema: &OpSchema,
    args: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<BTreeMap<String, ArgValue>, SchemaError> {
    if args.len() > schema.args.len() {
        return Err(SchemaError::PositionalOverflow {
            operation: schema.name.clone(),
            declared: schema.args.len(),
            received: args.len(),
        });
    }

    let mut bindings = BTreeMap::new();
    for (spec, value) in schema.args.iter().zip(args.iter()) {
        bindings.insert(canonical_name(&spec.name).to_owned(), value.clone());
    }

    for (keyword, value) in kwargs {
        let spec = schema
            .args
            .iter()
            .find(|spec| spec.name == *keyword || canonical_name(&spec.name) == keyword)
            .ok_or_else(|| SchemaError::UnknownKeyword {
                operation: schema.name.clone(),
                keyword: keyword.clone(),
            })?;
        let canonical = canonical_name(&spec.name).to_owned();
        if bindings.insert(canonical.clone(), value.clone()).is_some() {
            return Err(SchemaError::DuplicateBinding {
                operation: schema.name.clone(),
                argument: canonical,
            });
        }
    }

    for spec in &schema.args {
        if spec.required && !bindings.contains_key(canonical_name(&spec.name)) {
            return Err(SchemaError::MissingRequiredArgument {
                operation: schema.name.clone(),
                argument: canonical_name(&spec.name).to_owned(),
            });
        }
    }

    Ok(bindings)
}

/// Registry of declared operation schemas, keyed by operation identifier.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    table: FxHashMap<String, OpSchema>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            table: FxHashMap::default(),
        }
    }

    /// Schemas for the bundled kernel set. The `_`-suffixed operations are
    /// the in-place variants and declare their receiver mutable; everything
    /// else declares every argument immutable.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(OpSchema::new(
            "add",
            vec![
                ArgSpec::required("self", false),
                ArgSpec::required("other", false),
                ArgSpec::optional("alpha", false),
            ],
        ));
        registry.register(OpSchema::new(
            "sub",
            vec![
                ArgSpec::required("self", false),
                ArgSpec::required("other", false),
            ],
        ));
        registry.register(OpSchema::new(
            "mul",
            vec![
                ArgSpec::required("self", false),
                ArgSpec::required("other", false),
            ],
        ));
        registry.register(OpSchema::new(
            "neg",
            vec![ArgSpec::required("self", false)],
        ));
        registry.register(OpSchema::new(
            "abs",
            vec![ArgSpec::required("self", false)],
        ));
        registry.register(OpSchema::new(
            "sum",
            vec![ArgSpec::required("self", false)],
        ));
        registry.register(OpSchema::new(
            "add_",
            vec![
                ArgSpec::required("self", true),
                ArgSpec::required("other", false),
                ArgSpec::optional("alpha", false),
            ],
        ));
        registry.register(OpSchema::new(
            "mul_",
            vec![
                ArgSpec::required("self", true),
                ArgSpec::required("other", false),
            ],
        ));
        registry.register(OpSchema::new(
            "relu_",
            vec![ArgSpec::required("self", true)],
        ));
        registry.register(OpSchema::new(
            "zero_",
            vec![ArgSpec::required("self", true)],
        ));
        registry
    }

    pub fn register(&mut self, schema: OpSchema) {
        self.table.insert(schema.name.clone(), schema);
    }

    pub fn lookup(&self, operation: &str) -> Result<&OpSchema, SchemaError> {
        self.table
            .get(operation)
            .ok_or_else(|| SchemaError::UnknownOperation {
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

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
