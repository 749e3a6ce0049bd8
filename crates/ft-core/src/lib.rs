#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
    Bool,
}

impl DType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub dims: Vec<u32>,
}

impl Shape {
    #[must_use]
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    #[must_use]
    pub fn vector(len: u32) -> Self {
        Self { dims: vec![len] }
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    #[must_use]
    pub fn element_count(&self) -> Option<u64> {
        self.dims
            .iter()
            .try_fold(1_u64, |acc, dim| acc.checked_mul(u64::from(*dim)))
    }
}

/// Per-dimension element steps. Constructors produce row-major contiguous
/// strides; the audit layer only carries them as metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strides {
    pub steps: Vec<u32>,
}

impl Strides {
    pub fn contiguous(shape: &Shape) -> Result<Self, ValueError> {
        let mut steps = vec![0_u32; shape.rank()];
        let mut running = 1_u64;
        for (slot, dim) in steps.iter_mut().zip(shape.dims.iter()).rev() {
            *slot = u32::try_from(running).map_err(|_| ValueError::ShapeOverflow {
                shape: shape.clone(),
            })?;
            running = running
                .checked_mul(u64::from(*dim))
                .ok_or(ValueError::ShapeOverflow {
                    shape: shape.clone(),
                })?;
        }
        Ok(Self { steps })
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.steps.len()
    }
}

/// Unique identifier for a device. The bundled engine is host-only, so in
/// practice this is always `DeviceId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl DeviceId {
    pub const HOST: Self = Self(0);
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device:{}", self.0)
    }
}

/// Element literal. Floats are stored as bit patterns so equality is exact:
/// `-0.0` differs from `0.0`, and identical NaN payloads compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Literal {
    I64(i64),
    Bool(bool),
    F64Bits(u64),
}

impl Literal {
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        Self::F64Bits(value.to_bits())
    }

    #[must_use]
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Self::F64Bits(bits) => Some(f64::from_bits(bits)),
            Self::I64(value) => Some(value as f64),
            Self::Bool(_) => None,
        }
    }

    #[must_use]
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::I64(value) => Some(value),
            Self::Bool(_) | Self::F64Bits(_) => None,
        }
    }

    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(value),
            Self::I64(_) | Self::F64Bits(_) => None,
        }
    }

    #[must_use]
    pub fn is_integral(self) -> bool {
        matches!(self, Self::I64(_))
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::I64(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::F64Bits(bits) => write!(f, "{}", f64::from_bits(*bits)),
        }
    }
}

/// A dense host tensor with shared element storage.
///
/// `clone()` aliases the storage, so a cloned handle observes in-place
/// writes made through any other handle — the behavior the audit layer
/// exists to police. [`TensorValue::deep_copy`] is the explicit
/// storage-independent copy. `Rc` keeps the handle single-threaded,
/// matching the synchronous dispatch model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorValue {
    pub dtype: DType,
    pub shape: Shape,
    pub strides: Strides,
    pub storage_offset: usize,
    pub device: DeviceId,
    pub requires_grad: bool,
    storage: Rc<RefCell<Vec<Literal>>>,
}

impl TensorValue {
    pub fn new(dtype: DType, shape: Shape, elements: Vec<Literal>) -> Result<Self, ValueError> {
        let expected_count = shape.element_count().ok_or(ValueError::ShapeOverflow {
            shape: shape.clone(),
        })?;
        if expected_count != elements.len() as u64 {
            return Err(ValueError::ElementCountMismatch {
                shape,
                expected_count,
                actual_count: elements.len(),
            });
        }
        let strides = Strides::contiguous(&shape)?;
        Ok(Self {
            dtype,
            shape,
            strides,
            storage_offset: 0,
            device: DeviceId::HOST,
            requires_grad: false,
            storage: Rc::new(RefCell::new(elements)),
        })
    }

    pub fn vector_i64(values: &[i64]) -> Result<Self, ValueError> {
        let elements = values.iter().copied().map(Literal::I64).collect();
        Self::new(DType::I64, Shape::vector(values.len() as u32), elements)
    }

    pub fn vector_f64(values: &[f64]) -> Result<Self, ValueError> {
        let elements = values.iter().copied().map(Literal::from_f64).collect();
        Self::new(DType::F64, Shape::vector(values.len() as u32), elements)
    }

    #[must_use]
    pub fn with_requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shape.element_count().map_or(0, |count| count as usize)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Snapshot of the visible elements, in row-major order.
    #[must_use]
    pub fn elements(&self) -> Vec<Literal> {
        let storage = self.storage.borrow();
        let start = self.storage_offset;
        let end = start + self.len();
        storage[start..end].to_vec()
    }

    /// In-place write of all visible elements. The in-place kernels go
    /// through here; every aliasing handle observes the new contents.
    pub fn overwrite_elements(&self, elements: Vec<Literal>) -> Result<(), ValueError> {
        if elements.len() != self.len() {
            return Err(ValueError::LengthMismatch {
                expected: self.len(),
                actual: elements.len(),
            });
        }
        let mut storage = self.storage.borrow_mut();
        let start = self.storage_offset;
        storage[start..start + elements.len()].copy_from_slice(&elements);
        Ok(())
    }

    /// Structurally independent copy: fresh storage holding the visible
    /// elements, offset reset to zero, metadata otherwise preserved.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self {
            dtype: self.dtype,
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            storage_offset: 0,
            device: self.device,
            requires_grad: self.requires_grad,
            storage: Rc::new(RefCell::new(self.elements())),
        }
    }

    /// Whether two handles share the same underlying storage.
    #[must_use]
    pub fn aliases(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.storage, &other.storage)
    }

    /// Exact elementwise value equality: same shape, same element bits.
    /// Device, strides, and differentiability metadata do not participate.
    #[must_use]
    pub fn value_eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.elements() == other.elements()
    }

    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        self.elements().into_iter().map(Literal::as_f64).collect()
    }

    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        self.elements().into_iter().map(Literal::as_i64).collect()
    }
}

impl std::fmt::Display for TensorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const ELIDE_AFTER: usize = 8;
        write!(f, "tensor([")?;
        let elements = self.elements();
        for (index, literal) in elements.iter().take(ELIDE_AFTER).enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{literal}")?;
        }
        if elements.len() > ELIDE_AFTER {
            write!(f, ", …")?;
        }
        write!(f, "], dtype={})", self.dtype.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    ShapeOverflow {
        shape: Shape,
    },
    ElementCountMismatch {
        shape: Shape,
        expected_count: u64,
        actual_count: usize,
    },
    StrideRankMismatch {
        shape_rank: usize,
        stride_rank: usize,
    },
    LengthMismatch {
        expected: usize,
        actual: usize,
    },
}

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeOverflow { shape } => {
                write!(f, "shape element count overflowed: {:?}", shape.dims)
            }
            Self::ElementCountMismatch {
                shape,
                expected_count,
                actual_count,
            } => {
                write!(
                    f,
                    "tensor element count mismatch for shape {:?}: expected {}, got {}",
                    shape.dims, expected_count, actual_count
                )
            }
            Self::StrideRankMismatch {
                shape_rank,
                stride_rank,
            } => {
                write!(
                    f,
                    "stride rank {} does not match shape rank {}",
                    stride_rank, shape_rank
                )
            }
            Self::LengthMismatch { expected, actual } => {
                write!(
                    f,
                    "element write length mismatch: expected {}, got {}",
                    expected, actual
                )
            }
        }
    }
}

impl std::error::Error for ValueError {}

/// Tagged argument tree: every value an operation can receive or return is
/// a scalar, a tensor, or a container of further values. The recursive
/// walks below ([`deep_clone`], [`flatten_tensors`]) cover each case
/// exhaustively instead of inspecting types at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgValue {
    Scalar(Literal),
    Tensor(TensorValue),
    List(Vec<ArgValue>),
    Map(BTreeMap<String, ArgValue>),
}

impl ArgValue {
    #[must_use]
    pub fn scalar_i64(value: i64) -> Self {
        Self::Scalar(Literal::I64(value))
    }

    #[must_use]
    pub fn scalar_f64(value: f64) -> Self {
        Self::Scalar(Literal::from_f64(value))
    }

    #[must_use]
    pub fn scalar_bool(value: bool) -> Self {
        Self::Scalar(Literal::Bool(value))
    }

    #[must_use]
    pub fn as_scalar_literal(&self) -> Option<Literal> {
        match self {
            Self::Scalar(literal) => Some(*literal),
            Self::Tensor(_) | Self::List(_) | Self::Map(_) => None,
        }
    }

    #[must_use]
    pub fn as_f64_scalar(&self) -> Option<f64> {
        self.as_scalar_literal().and_then(Literal::as_f64)
    }

    #[must_use]
    pub fn as_i64_scalar(&self) -> Option<i64> {
        self.as_scalar_literal().and_then(Literal::as_i64)
    }

    #[must_use]
    pub fn as_bool_scalar(&self) -> Option<bool> {
        self.as_scalar_literal().and_then(Literal::as_bool)
    }

    #[must_use]
    pub fn as_tensor(&self) -> Option<&TensorValue> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            Self::Scalar(_) | Self::List(_) | Self::Map(_) => None,
        }
    }
}

/// Recursive storage-independent copy. Every tensor leaf gets fresh
/// storage; scalar leaves are copied by value; containers are rebuilt.
#[must_use]
pub fn deep_clone(value: &ArgValue) -> ArgValue {
    match value {
        ArgValue::Scalar(literal) => ArgValue::Scalar(*literal),
        ArgValue::Tensor(tensor) => ArgValue::Tensor(tensor.deep_copy()),
        ArgValue::List(items) => ArgValue::List(items.iter().map(deep_clone).collect()),
        ArgValue::Map(entries) => ArgValue::Map(
            entries
                .iter()
                .map(|(key, item)| (key.clone(), deep_clone(item)))
                .collect(),
        ),
    }
}

/// Flatten a value tree into its tensor leaves, left to right. Scalars and
/// other non-tensor leaves are excluded. The returned handles alias the
/// tree's storage.
#[must_use]
pub fn flatten_tensors(value: &ArgValue) -> SmallVec<[TensorValue; 4]> {
    let mut leaves = SmallVec::new();
    collect_tensors(value, &mut leaves);
    leaves
}

fn collect_tensors(value: &ArgValue, leaves: &mut SmallVec<[TensorValue; 4]>) {
    match value {
        ArgValue::Scalar(_) => {}
        ArgValue::Tensor(tensor) => leaves.push(tensor.clone()),
        ArgValue::List(items) => {
            for item in items {
                collect_tensors(item, leaves);
            }
        }
        ArgValue::Map(entries) => {
            for item in entries.values() {
                collect_tensors(item, leaves);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ArgValue, DType, DeviceId, Literal, Shape, Strides, TensorValue, ValueError, deep_clone,
        flatten_tensors,
    };
    use std::collections::BTreeMap;

    #[test]
    fn contiguous_strides_are_row_major() {
        let shape = Shape {
            dims: vec![2, 3, 4],
        };
        let strides = Strides::contiguous(&shape).expect("strides should build");
        assert_eq!(strides.steps, vec![12, 4, 1]);
    }

    #[test]
    fn tensor_new_rejects_element_count_mismatch() {
        let err = TensorValue::new(DType::I64, Shape::vector(3), vec![Literal::I64(1)])
            .expect_err("count mismatch should fail");
        assert!(matches!(err, ValueError::ElementCountMismatch { .. }));
    }

    #[test]
    fn clone_aliases_storage_and_observes_writes() {
        let tensor = TensorValue::vector_i64(&[1, 2]).expect("vector should build");
        let alias = tensor.clone();
        assert!(tensor.aliases(&alias));

        alias
            .overwrite_elements(vec![Literal::I64(7), Literal::I64(8)])
            .expect("overwrite should succeed");
        assert_eq!(tensor.to_i64_vec(), Some(vec![7, 8]));
    }

    #[test]
    fn deep_copy_detaches_storage() {
        let tensor = TensorValue::vector_i64(&[1, 2]).expect("vector should build");
        let copy = tensor.deep_copy();
        assert!(!tensor.aliases(&copy));

        tensor
            .overwrite_elements(vec![Literal::I64(9), Literal::I64(9)])
            .expect("overwrite should succeed");
        assert_eq!(copy.to_i64_vec(), Some(vec![1, 2]));
        assert!(!tensor.value_eq(&copy));
    }

    #[test]
    fn value_eq_is_bit_exact_for_floats() {
        let positive = TensorValue::vector_f64(&[0.0]).expect("vector should build");
        let negative = TensorValue::vector_f64(&[-0.0]).expect("vector should build");
        assert!(!positive.value_eq(&negative));

        let nan_a = TensorValue::vector_f64(&[f64::NAN]).expect("vector should build");
        let nan_b = TensorValue::vector_f64(&[f64::NAN]).expect("vector should build");
        assert!(nan_a.value_eq(&nan_b));
    }

    #[test]
    fn value_eq_ignores_differentiability_metadata() {
        let plain = TensorValue::vector_f64(&[1.5]).expect("vector should build");
        let traced = plain.deep_copy().with_requires_grad(true);
        assert!(plain.value_eq(&traced));
    }

    #[test]
    fn deep_clone_walks_nested_containers() {
        let tensor = TensorValue::vector_i64(&[1, 2]).expect("vector should build");
        let mut map = BTreeMap::new();
        map.insert("weights".to_owned(), ArgValue::Tensor(tensor.clone()));
        let tree = ArgValue::List(vec![
            ArgValue::scalar_i64(5),
            ArgValue::Map(map),
        ]);

        let cloned = deep_clone(&tree);
        let original_leaves = flatten_tensors(&tree);
        let cloned_leaves = flatten_tensors(&cloned);
        assert_eq!(original_leaves.len(), 1);
        assert_eq!(cloned_leaves.len(), 1);
        assert!(!original_leaves[0].aliases(&cloned_leaves[0]));
        assert!(original_leaves[0].value_eq(&cloned_leaves[0]));
    }

    #[test]
    fn flatten_excludes_scalar_leaves_and_preserves_order() {
        let first = TensorValue::vector_i64(&[1]).expect("vector should build");
        let second = TensorValue::vector_i64(&[2]).expect("vector should build");
        let tree = ArgValue::List(vec![
            ArgValue::Tensor(first.clone()),
            ArgValue::scalar_f64(3.5),
            ArgValue::List(vec![ArgValue::Tensor(second.clone())]),
        ]);

        let leaves = flatten_tensors(&tree);
        assert_eq!(leaves.len(), 2);
        assert!(leaves[0].aliases(&first));
        assert!(leaves[1].aliases(&second));
    }

    #[test]
    fn tensor_display_elides_long_element_lists() {
        let tensor =
            TensorValue::vector_i64(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).expect("vector should build");
        let rendered = tensor.to_string();
        assert!(rendered.starts_with("tensor([1, 2"));
        assert!(rendered.contains('…'));
        assert!(rendered.ends_with("dtype=i64)"));
    }

    #[test]
    fn device_id_display() {
        assert_eq!(DeviceId::HOST.to_string(), "device:0");
        assert_eq!(DeviceId(2).to_string(), "device:2");
    }

    #[test]
    fn tensor_serde_round_trip_detaches_storage() {
        let tensor = TensorValue::vector_f64(&[1.0, 2.0]).expect("vector should build");
        let encoded = serde_json::to_string(&tensor).expect("serialize should work");
        let decoded: TensorValue = serde_json::from_str(&encoded).expect("deserialize should work");
        assert!(tensor.value_eq(&decoded));
        assert!(!tensor.aliases(&decoded));
    }
}
