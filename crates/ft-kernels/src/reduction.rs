#![forbid(unsafe_code)]

use crate::KernelError;
use crate::arithmetic::ensure_no_kwargs;
use ft_core::{ArgValue, Literal};
use std::collections::BTreeMap;

/// Full reduction to a scalar. Integer inputs stay on the integer path;
/// anything else sums as f64.
pub(crate) fn sum(
    args: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<ArgValue, KernelError> {
    ensure_no_kwargs("sum", kwargs)?;
    if args.len() != 1 {
        return Err(KernelError::ArityMismatch {
            operation: "sum",
            expected: 1,
            actual: args.len(),
        });
    }

    let elements = match &args[0] {
        ArgValue::Scalar(literal) => vec![*literal],
        ArgValue::Tensor(tensor) => tensor.elements(),
        ArgValue::List(_) | ArgValue::Map(_) => {
            return Err(KernelError::TypeMismatch {
                operation: "sum",
                detail: "expected scalar or tensor operand",
            });
        }
    };

    if elements.iter().any(|l| matches!(l, Literal::Bool(_))) {
        return Err(KernelError::TypeMismatch {
            operation: "sum",
            detail: "expected numeric operand",
        });
    }

    if elements.iter().all(|literal| literal.is_integral()) {
        let total = elements
            .iter()
            .filter_map(|literal| literal.as_i64())
            .fold(0_i64, i64::wrapping_add);
        return Ok(ArgValue::Scalar(Literal::I64(total)));
    }

    let total = elements
        .iter()
        .filter_map(|literal| literal.as_f64())
        .sum::<f64>();
    Ok(ArgValue::Scalar(Literal::from_f64(total)))
}
