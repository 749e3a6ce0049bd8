#![forbid(unsafe_code)]

use ft_core::{ArgValue, DType, DeviceId, Shape, Strides, TensorValue, ValueError};
use std::collections::BTreeMap;

/// Read-only metadata snapshot taken when a tensor is wrapped. Calling
/// code sees exactly what the real value reported at wrap time; the
/// snapshot is never updated afterwards, only replaced by re-wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorMeta {
    pub dtype: DType,
    pub shape: Shape,
    pub strides: Strides,
    pub storage_offset: usize,
    pub device: DeviceId,
    pub requires_grad: bool,
}

impl TensorMeta {
    fn snapshot(tensor: &TensorValue) -> Result<Self, ValueError> {
        if tensor.strides.rank() != tensor.shape.rank() {
            return Err(ValueError::StrideRankMismatch {
                shape_rank: tensor.shape.rank(),
                stride_rank: tensor.strides.rank(),
            });
        }
        tensor
            .shape
            .element_count()
            .ok_or(ValueError::ShapeOverflow {
                shape: tensor.shape.clone(),
            })?;
        Ok(Self {
            dtype: tensor.dtype,
            shape: tensor.shape.clone(),
            strides: tensor.strides.clone(),
            storage_offset: tensor.storage_offset,
            device: tensor.device,
            requires_grad: tensor.requires_grad,
        })
    }
}

/// Metadata-preserving proxy standing in for a real tensor. The real value
/// is held privately; the handle never duplicates its storage. Operations
/// dispatched on the handle are intercepted and audited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedTensor {
    inner: TensorValue,
    meta: TensorMeta,
}

impl CheckedTensor {
    /// Wrap a real tensor. Fails when the source cannot report coherent
    /// layout metadata.
    pub fn wrap(inner: TensorValue) -> Result<Self, ValueError> {
        let meta = TensorMeta::snapshot(&inner)?;
        Ok(Self { inner, meta })
    }

    #[must_use]
    pub fn inner(&self) -> &TensorValue {
        &self.inner
    }

    #[must_use]
    pub fn into_inner(self) -> TensorValue {
        self.inner
    }

    #[must_use]
    pub fn meta(&self) -> &TensorMeta {
        &self.meta
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.meta.shape
    }

    #[must_use]
    pub fn strides(&self) -> &Strides {
        &self.meta.strides
    }

    #[must_use]
    pub fn storage_offset(&self) -> usize {
        self.meta.storage_offset
    }

    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.meta.device
    }

    #[must_use]
    pub fn requires_grad(&self) -> bool {
        self.meta.requires_grad
    }
}

impl std::fmt::Display for CheckedTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.meta.requires_grad {
            write!(f, "CheckedTensor({}, requires_grad=true)", self.inner)
        } else {
            write!(f, "CheckedTensor({})", self.inner)
        }
    }
}

/// Caller-facing value tree: like [`ArgValue`] but admitting wrapped
/// tensors at the leaves, nested arbitrarily deep inside containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedValue {
    Checked(CheckedTensor),
    Plain(ArgValue),
    List(Vec<TrackedValue>),
    Map(BTreeMap<String, TrackedValue>),
}

impl TrackedValue {
    pub fn checked(tensor: TensorValue) -> Result<Self, ValueError> {
        Ok(Self::Checked(CheckedTensor::wrap(tensor)?))
    }

    #[must_use]
    pub fn as_checked(&self) -> Option<&CheckedTensor> {
        match self {
            Self::Checked(tensor) => Some(tensor),
            Self::Plain(_) | Self::List(_) | Self::Map(_) => None,
        }
    }

    #[must_use]
    pub fn as_plain(&self) -> Option<&ArgValue> {
        match self {
            Self::Plain(value) => Some(value),
            Self::Checked(_) | Self::List(_) | Self::Map(_) => None,
        }
    }

    /// Whether any leaf of this tree is a wrapped tensor.
    #[must_use]
    pub fn contains_checked(&self) -> bool {
        match self {
            Self::Checked(_) => true,
            Self::Plain(_) => false,
            Self::List(items) => items.iter().any(TrackedValue::contains_checked),
            Self::Map(entries) => entries.values().any(TrackedValue::contains_checked),
        }
    }
}

/// Recursively replace every wrapped tensor with its privately held real
/// value. Non-wrapped values pass through unchanged.
#[must_use]
pub fn unwrap_tree(value: &TrackedValue) -> ArgValue {
    match value {
        TrackedValue::Checked(tensor) => ArgValue::Tensor(tensor.inner().clone()),
        TrackedValue::Plain(plain) => plain.clone(),
        TrackedValue::List(items) => ArgValue::List(items.iter().map(unwrap_tree).collect()),
        TrackedValue::Map(entries) => ArgValue::Map(
            entries
                .iter()
                .map(|(key, item)| (key.clone(), unwrap_tree(item)))
                .collect(),
        ),
    }
}

/// Recursively wrap every tensor leaf of an operation result. Non-tensor
/// results pass through unchanged, never coerced into a wrapped handle.
pub fn wrap_tree(value: ArgValue) -> Result<TrackedValue, ValueError> {
    match value {
        ArgValue::Tensor(tensor) => TrackedValue::checked(tensor),
        ArgValue::Scalar(literal) => Ok(TrackedValue::Plain(ArgValue::Scalar(literal))),
        ArgValue::List(items) => Ok(TrackedValue::List(
            items
                .into_iter()
                .map(wrap_tree)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        ArgValue::Map(entries) => Ok(TrackedValue::Map(
            entries
                .into_iter()
                .map(|(key, item)| wrap_tree(item).map(|wrapped| (key, wrapped)))
                .collect::<Result<BTreeMap<_, _>, _>>()?,
        )),
    }
}
