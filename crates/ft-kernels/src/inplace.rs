#![forbid(unsafe_code)]

use crate::KernelError;
use crate::arithmetic::{
    ensure_no_kwargs, eval_binary_elementwise, eval_unary_elementwise, take_alpha,
};
use ft_core::{ArgValue, Literal, TensorValue};
use std::collections::BTreeMap;

// In-place kernels mutate the first operand's storage and return the same
// handle, so every aliasing handle (including the caller's) observes the
// new contents.

fn inplace_target<'call>(
    operation: &'static str,
    args: &'call [ArgValue],
    expected: usize,
) -> Result<&'call TensorValue, KernelError> {
    if args.len() != expected {
        return Err(KernelError::ArityMismatch {
            operation,
            expected,
            actual: args.len(),
        });
    }
    args[0].as_tensor().ok_or(KernelError::TypeMismatch {
        operation,
        detail: "in-place target must be a tensor",
    })
}

fn write_back(
    operation: &'static str,
    target: &TensorValue,
    combined: ArgValue,
) -> Result<ArgValue, KernelError> {
    let ArgValue::Tensor(result) = combined else {
        return Err(KernelError::TypeMismatch {
            operation,
            detail: "in-place result must be a tensor",
        });
    };
    target.overwrite_elements(result.elements())?;
    Ok(ArgValue::Tensor(target.clone()))
}

pub(crate) fn add_(
    args: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<ArgValue, KernelError> {
    if args.len() < 2 {
        return Err(KernelError::ArityMismatch {
            operation: "add_",
            expected: 2,
            actual: args.len(),
        });
    }
    let target = args[0].as_tensor().ok_or(KernelError::TypeMismatch {
        operation: "add_",
        detail: "in-place target must be a tensor",
    })?;
    let rhs = match take_alpha("add_", &args[2..], kwargs)? {
        Some(alpha) => eval_binary_elementwise(
            "add_",
            &args[1],
            &ArgValue::Scalar(alpha),
            |a, b| a * b,
            |a, b| a * b,
        )?,
        None => args[1].clone(),
    };
    let combined = eval_binary_elementwise(
        "add_",
        &ArgValue::Tensor(target.clone()),
        &rhs,
        |a, b| a + b,
        |a, b| a + b,
    )?;
    write_back("add_", target, combined)
}

pub(crate) fn mul_(
    args: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<ArgValue, KernelError> {
    ensure_no_kwargs("mul_", kwargs)?;
    let target = inplace_target("mul_", args, 2)?;
    let combined = eval_binary_elementwise(
        "mul_",
        &ArgValue::Tensor(target.clone()),
        &args[1],
        |a, b| a * b,
        |a, b| a * b,
    )?;
    write_back("mul_", target, combined)
}

pub(crate) fn relu_(
    args: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<ArgValue, KernelError> {
    ensure_no_kwargs("relu_", kwargs)?;
    let target = inplace_target("relu_", args, 1)?;
    let clamped = eval_unary_elementwise(
        "relu_",
        &ArgValue::Tensor(target.clone()),
        |a| a.max(0),
        |a| a.max(0.0),
    )?;
    write_back("relu_", target, clamped)
}

pub(crate) fn zero_(
    args: &[ArgValue],
    kwargs: &BTreeMap<String, ArgValue>,
) -> Result<ArgValue, KernelError> {
    ensure_no_kwargs("zero_", kwargs)?;
    let target = inplace_target("zero_", args, 1)?;
    let zeros = target
        .elements()
        .into_iter()
        .map(|literal| match literal {
            Literal::I64(_) => Literal::I64(0),
            Literal::F64Bits(_) => Literal::from_f64(0.0),
            Literal::Bool(_) => Literal::Bool(false),
        })
        .collect();
    target.overwrite_elements(zeros)?;
    Ok(ArgValue::Tensor(target.clone()))
}

#[cfg(test)]
mod tests {
    use super::{add_, relu_, zero_};
    use crate::KernelError;
    use ft_core::{ArgValue, TensorValue};
    use std::collections::BTreeMap;

    #[test]
    fn add_mutates_target_in_place_and_returns_it() {
        let target = TensorValue::vector_i64(&[1, 2]).expect("vector should build");
        let other = TensorValue::vector_i64(&[3, 4]).expect("vector should build");
        let out = add_(
            &[
                ArgValue::Tensor(target.clone()),
                ArgValue::Tensor(other.clone()),
            ],
            &BTreeMap::new(),
        )
        .expect("add_ should succeed");

        assert_eq!(target.to_i64_vec(), Some(vec![4, 6]));
        assert_eq!(other.to_i64_vec(), Some(vec![3, 4]));
        let returned = out.as_tensor().expect("output should be a tensor");
        assert!(returned.aliases(&target));
    }

    #[test]
    fn add_with_alpha_scales_the_addend() {
        let target = TensorValue::vector_i64(&[1, 2]).expect("vector should build");
        let mut kwargs = BTreeMap::new();
        kwargs.insert("alpha".to_owned(), ArgValue::scalar_i64(3));
        add_(
            &[
                ArgValue::Tensor(target.clone()),
                ArgValue::Tensor(TensorValue::vector_i64(&[10, 10]).expect("vector should build")),
            ],
            &kwargs,
        )
        .expect("add_ should succeed");
        assert_eq!(target.to_i64_vec(), Some(vec![31, 32]));
    }

    #[test]
    fn add_rejects_scalar_target() {
        let err = add_(
            &[ArgValue::scalar_i64(1), ArgValue::scalar_i64(2)],
            &BTreeMap::new(),
        )
        .expect_err("scalar target should fail");
        assert!(matches!(err, KernelError::TypeMismatch { .. }));
    }

    #[test]
    fn relu_clamps_negative_elements() {
        let target = TensorValue::vector_i64(&[-3, 0, 5]).expect("vector should build");
        relu_(&[ArgValue::Tensor(target.clone())], &BTreeMap::new())
            .expect("relu_ should succeed");
        assert_eq!(target.to_i64_vec(), Some(vec![0, 0, 5]));
    }

    #[test]
    fn zero_preserves_element_kinds() {
        let target = TensorValue::vector_f64(&[1.5, -2.5]).expect("vector should build");
        zero_(&[ArgValue::Tensor(target.clone())], &BTreeMap::new())
            .expect("zero_ should succeed");
        assert_eq!(target.to_f64_vec(), Some(vec![0.0, 0.0]));
    }
}
