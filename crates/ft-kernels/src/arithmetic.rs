#![forbid(unsafe_code)]

use crate::KernelError;
use ft_core::{ArgValue, DType, Literal, TensorValue};
use std::collections::BTreeMap;

/// Combine two literals, dispatching on int/float paths. Boolean operands
/// are rejected; mixed int/float promotes to the float path.
pub(crate) fn binary_literal_op(
    lhs: Literal,
    rhs: Literal,
    operation: &'static str,
    int_op: &impl Fn(i64, i64) -> i64,
    float_op: &impl Fn(f64, f64) -> f64,
) -> Result<Literal, KernelError> {
    if let (Literal::I64(left), Literal::I64(right)) = (lhs, rhs) {
        return Ok(Literal::I64(int_op(left, right)));
    }
    let left = lhs.as_f64().ok_or(KernelError::TypeMismatch {
        operation,
        detail: "expected numeric operand",
    })?;
    let right = rhs.as_f64().ok_or(KernelError::TypeMismatch {
        operation,
        detail: "expected numeric operand",
    })?;
    Ok(Literal::from_f64(float_op(left, right)))
}

fn infer_dtype(elements: &[Literal]) -> DType {
    if !elements.is_empty()
        && elements
            .iter()
            .all(|literal| matches!(literal, Literal::I64(_)))
    {
        DType::I64
    } else {
        DType::F64
    }
}

/// Binary elementwise evaluation over scalar/tensor operand combinations.
/// Tensor operands must agree on shape; a scalar broadcasts against the
/// tensor operand.
pub(crate) fn eval_binary_elementwise(
    operation: &'static str,
    lhs: &ArgValue,
    rhs: &ArgValue,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<ArgValue, KernelError> {
    match (lhs, rhs) {
        (ArgValue::Scalar(left), ArgValue::Scalar(right)) => Ok(ArgValue::Scalar(
            binary_literal_op(*left, *right, operation, &int_op, &float_op)?,
        )),
        (ArgValue::Tensor(left), ArgValue::Tensor(right)) => {
            if left.shape != right.shape {
                return Err(KernelError::ShapeMismatch {
                    operation,
                    left: left.shape.clone(),
                    right: right.shape.clone(),
                });
            }
            let elements = left
                .elements()
                .into_iter()
                .zip(right.elements())
                .map(|(l, r)| binary_literal_op(l, r, operation, &int_op, &float_op))
                .collect::<Result<Vec<_>, _>>()?;
            let dtype = infer_dtype(&elements);
            Ok(ArgValue::Tensor(TensorValue::new(
                dtype,
                left.shape.clone(),
                elements,
            )?))
        }
        (ArgValue::Scalar(left), ArgValue::Tensor(right)) => {
            let elements = right
                .elements()
                .into_iter()
                .map(|r| binary_literal_op(*left, r, operation, &int_op, &float_op))
                .collect::<Result<Vec<_>, _>>()?;
            let dtype = infer_dtype(&elements);
            Ok(ArgValue::Tensor(TensorValue::new(
                dtype,
                right.shape.clone(),
                elements,
            )?))
        }
        (ArgValue::Tensor(left), ArgValue::Scalar(right)) => {
            let elements = left
                .elements()
                .into_iter()
                .map(|l| binary_literal_op(l, *right, operation, &int_op, &float_op))
                .collect::<Result<Vec<_>, _>>()?;
            let dtype = infer_dtype(&elements);
            Ok(ArgValue::Tensor(TensorValue::new(
                dtype,
                left.shape.clone(),
                elements,
            )?))
        }
        _ => Err(KernelError::TypeMismatch {
            operation,
            detail: "expected scalar or tensor operands",
        }),
    }
}

/// Unary elementwise evaluation preserving the int/float split.
pub(crate) fn eval_unary_elementwise(
    operation: &'static str,
    input: &ArgValue,
    int_op: impl Fn(i64) -> i64,
    float_op: impl Fn(f64) -> f64,
) -> Result<ArgValue, KernelError> {
    let map_literal = |literal: Literal| -> Result<Literal, KernelError> {
        match literal {
            Literal::I64(value) => Ok(Literal::I64(int_op(value))),
            Literal::F64Bits(_) => {
                let value = literal.as_f64().ok_or(KernelError::TypeMismatch {
                    operation,
                    detail: "expected numeric operand",
                })?;
                Ok(Literal::from_f64(float_op(value)))
            }
            Literal::Bool(_) => Err(KernelError::TypeMismatch {
                operation,
                detail: "expected numeric operand",
            }),
        }
    };

    match input {
        ArgValue::Scalar(literal) => Ok(ArgValue::Scalar(map_literal(*literal)?)),
        ArgValue::Tensor(tensor) => {
            let elements = tensor
                .elements()
                .into_iter()
                .map(map_literal)
                .collect::<Result<Vec<_>, _>>()?;
            let dtype = infer_dtype(&elements);
            Ok(ArgValue::Tensor(TensorValue::new(
                dtype,
                tensor.shape.clone(),
                elements,
            )?))
        }
        ArgValue::List(_) | ArgValue::Map(_) => Err(KernelError::TypeMismatch {
            operation,
            detail: "expected scalar or tensor operand",
        }),
    }
}

pub(crate) fn ensure_no_kwargs(
    operation: &'static str,
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<(), KernelError> {
    if kwargs.is_empty() {
        Ok(())
    } else {
        Err(KernelError::TypeMismatch {
            operation,
            detail: "unexpected keyword parameter",
        })
    }
}

/// Resolve the optional `alpha` scale, accepted either as a trailing
/// positional argument or as a keyword, never both.
pub(crate) fn take_alpha(
    operation: &'static str,
    extra_positional: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<Option<Literal>, KernelError> {
    if extra_positional.len() > 1 {
        return Err(KernelError::ArityMismatch {
            operation,
            expected: 3,
            actual: 2 + extra_positional.len(),
        });
    }
    for key in kwargs.keys() {
        if key != "alpha" {
            return Err(KernelError::TypeMismatch {
                operation,
                detail: "unexpected keyword parameter",
            });
        }
    }

    let positional = extra_positional.first();
    let keyword = kwargs.get("alpha");
    let value = match (positional, keyword) {
        (Some(_), Some(_)) => {
            return Err(KernelError::DuplicateParameter {
                operation,
                parameter: "alpha",
            });
        }
        (Some(value), None) | (None, Some(value)) => value,
        (None, None) => return Ok(None),
    };

    match value.as_scalar_literal() {
        Some(literal) if !matches!(literal, Literal::Bool(_)) => Ok(Some(literal)),
        _ => Err(KernelError::TypeMismatch {
            operation,
            detail: "alpha must be a numeric scalar",
        }),
    }
}

fn scaled_operand(
    operation: &'static str,
    value: &ArgValue,
    alpha: Literal,
) -> Result<ArgValue, KernelError> {
    eval_binary_elementwise(
        operation,
        value,
        &ArgValue::Scalar(alpha),
        |a, b| a * b,
        |a, b| a * b,
    )
}

fn binary_operands<'call>(
    operation: &'static str,
    args: &'call [ArgValue],
) -> Result<(&'call ArgValue, &'call ArgValue), KernelError> {
    if args.len() < 2 {
        return Err(KernelError::ArityMismatch {
            operation,
            expected: 2,
            actual: args.len(),
        });
    }
    Ok((&args[0], &args[1]))
}

pub(crate) fn add(
    args: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<ArgValue, KernelError> {
    let (lhs, rhs) = binary_operands("add", args)?;
    let rhs = match take_alpha("add", &args[2..], kwargs)? {
        Some(alpha) => scaled_operand("add", rhs, alpha)?,
        None => rhs.clone(),
    };
    eval_binary_elementwise("add", lhs, &rhs, |a, b| a + b, |a, b| a + b)
}

pub(crate) fn sub(
    args: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<ArgValue, KernelError> {
    ensure_no_kwargs("sub", kwargs)?;
    if args.len() != 2 {
        return Err(KernelError::ArityMismatch {
            operation: "sub",
            expected: 2,
            actual: args.len(),
        });
    }
    eval_binary_elementwise("sub", &args[0], &args[1], |a, b| a - b, |a, b| a - b)
}

pub(crate) fn mul(
    args: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<ArgValue, KernelError> {
    ensure_no_kwargs("mul", kwargs)?;
    if args.len() != 2 {
        return Err(KernelError::ArityMismatch {
            operation: "mul",
            expected: 2,
            actual: args.len(),
        });
    }
    eval_binary_elementwise("mul", &args[0], &args[1], |a, b| a * b, |a, b| a * b)
}

pub(crate) fn neg(
    args: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<ArgValue, KernelError> {
    ensure_no_kwargs("neg", kwargs)?;
    if args.len() != 1 {
        return Err(KernelError::ArityMismatch {
            operation: "neg",
            expected: 1,
            actual: args.len(),
        });
    }
    eval_unary_elementwise("neg", &args[0], |a| -a, |a| -a)
}

pub(crate) fn abs(
    args: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<ArgValue, KernelError> {
    ensure_no_kwargs("abs", kwargs)?;
    if args.len() != 1 {
        return Err(KernelError::ArityMismatch {
            operation: "abs",
            expected: 1,
            actual: args.len(),
        });
    }
    eval_unary_elementwise("abs", &args[0], i64::abs, f64::abs)
}
