//! Library-wide error type.
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors returned by mesh construction, element construction, expression compilation and
/// expression evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The expression can not be compiled, for example because it mixes function spaces
    /// defined on different meshes or uses its argument non-linearly.
    Compilation(String),
    /// Point coordinates or an entity dimension do not match the dimension of the cell.
    Dimension { expected: usize, actual: usize },
    /// A cell index is not a valid local or ghost cell of the mesh.
    CellIndexOutOfBounds { index: usize, num_cells: usize },
    /// Data supplied by the caller does not have the shape the operation expects.
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The requested element family, degree or block structure is not available.
    UnsupportedElement(String),
    /// The mesh data is inconsistent.
    InvalidMesh(String),
    /// There is no quadrature rule with the requested strength.
    NoQuadratureRule { strength: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compilation(msg) => write!(f, "failed to compile expression: {msg}"),
            Self::Dimension { expected, actual } => {
                write!(f, "dimension mismatch: expected dimension {expected}, got {actual}")
            }
            Self::CellIndexOutOfBounds { index, num_cells } => {
                write!(
                    f,
                    "cell index {index} is out of bounds for mesh with {num_cells} local and ghost cells"
                )
            }
            Self::ShapeMismatch { what, expected, actual } => {
                write!(f, "shape mismatch for {what}: expected {expected}, got {actual}")
            }
            Self::UnsupportedElement(msg) => write!(f, "unsupported element: {msg}"),
            Self::InvalidMesh(msg) => write!(f, "invalid mesh: {msg}"),
            Self::NoQuadratureRule { strength } => {
                write!(f, "there is no quadrature rule of strength {strength} available")
            }
        }
    }
}

impl std::error::Error for Error {}
