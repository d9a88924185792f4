//! Symbolic expressions over finite element functions.
//!
//! Expressions are trees built from terminals (literals, constants, coefficients, the argument
//! of a function space and the spatial coordinate of a mesh) with the usual arithmetic operators
//! and a few elementary functions. Gradients may be applied to any expression of rank at most
//! one. They are eliminated by [`Expr::apply_derivatives`], which applies the chain rule until
//! only gradients of coefficients and arguments remain.
use crate::error::Error;
use crate::function::{Constant, Function};
use crate::mesh::Mesh;
use crate::space::FunctionSpace;
use crate::Real;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

/// Elementary functions of a scalar expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFunction {
    Sin,
    Cos,
    Exp,
    Ln,
    Sqrt,
}

impl MathFunction {
    pub fn apply<T: Real>(&self, x: T) -> T {
        match self {
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Exp => x.exp(),
            Self::Ln => x.ln(),
            Self::Sqrt => x.sqrt(),
        }
    }
}

/// A symbolic expression.
#[derive(Clone)]
pub enum Expr<T: Real> {
    Literal(T),
    Constant(Arc<Constant<T>>),
    Coefficient(Arc<Function<T>>),
    /// The trial function of a function space.
    Argument(Arc<FunctionSpace<T>>),
    SpatialCoordinate(Arc<Mesh<T>>),
    Sum(Box<Expr<T>>, Box<Expr<T>>),
    Negation(Box<Expr<T>>),
    /// Product where at least one of the factors is a scalar.
    Product(Box<Expr<T>>, Box<Expr<T>>),
    /// Division by a scalar.
    Division(Box<Expr<T>>, Box<Expr<T>>),
    Power(Box<Expr<T>>, T),
    Math(MathFunction, Box<Expr<T>>),
    Grad(Box<Expr<T>>),
    /// Outer product of two vectors.
    Outer(Box<Expr<T>>, Box<Expr<T>>),
    /// Selects an entry along the first axis.
    Index(Box<Expr<T>>, usize),
}

impl<T: Real> fmt::Debug for Expr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value:?}"),
            Self::Constant(c) => write!(f, "Constant({:?})", c.value()),
            Self::Coefficient(function) => write!(f, "{}", function.name()),
            Self::Argument(space) => write!(f, "Argument({:?})", space.element().family()),
            Self::SpatialCoordinate(_) => write!(f, "x"),
            Self::Sum(a, b) => write!(f, "({a:?} + {b:?})"),
            Self::Negation(a) => write!(f, "-{a:?}"),
            Self::Product(a, b) => write!(f, "{a:?} * {b:?}"),
            Self::Division(a, b) => write!(f, "{a:?} / {b:?}"),
            Self::Power(a, p) => write!(f, "{a:?}^{p:?}"),
            Self::Math(function, a) => write!(f, "{function:?}({a:?})"),
            Self::Grad(a) => write!(f, "grad({a:?})"),
            Self::Outer(a, b) => write!(f, "outer({a:?}, {b:?})"),
            Self::Index(a, i) => write!(f, "{a:?}[{i}]"),
        }
    }
}

fn compilation_error<T>(msg: impl Into<String>) -> Result<T, Error> {
    Err(Error::Compilation(msg.into()))
}

impl<T: Real> Expr<T> {
    pub fn literal(value: T) -> Self {
        Self::Literal(value)
    }

    pub fn constant(constant: Constant<T>) -> Self {
        Self::Constant(Arc::new(constant))
    }

    pub fn coefficient(function: Arc<Function<T>>) -> Self {
        Self::Coefficient(function)
    }

    pub fn argument(space: Arc<FunctionSpace<T>>) -> Self {
        Self::Argument(space)
    }

    pub fn spatial_coordinate(mesh: Arc<Mesh<T>>) -> Self {
        Self::SpatialCoordinate(mesh)
    }

    pub fn grad(self) -> Self {
        Self::Grad(Box::new(self))
    }

    pub fn outer(self, other: Self) -> Self {
        Self::Outer(Box::new(self), Box::new(other))
    }

    pub fn index(self, i: usize) -> Self {
        Self::Index(Box::new(self), i)
    }

    pub fn powf(self, exponent: T) -> Self {
        Self::Power(Box::new(self), exponent)
    }

    pub fn sin(self) -> Self {
        Self::Math(MathFunction::Sin, Box::new(self))
    }

    pub fn cos(self) -> Self {
        Self::Math(MathFunction::Cos, Box::new(self))
    }

    pub fn exp(self) -> Self {
        Self::Math(MathFunction::Exp, Box::new(self))
    }

    pub fn ln(self) -> Self {
        Self::Math(MathFunction::Ln, Box::new(self))
    }

    pub fn sqrt(self) -> Self {
        Self::Math(MathFunction::Sqrt, Box::new(self))
    }

    /// Whether this expression is a terminal, i.e. has no operands.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Literal(_) | Self::Constant(_) | Self::Coefficient(_) | Self::Argument(_) | Self::SpatialCoordinate(_)
        )
    }

    /// Calls `f` on every node of the tree, parents before children.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr<T>)) {
        f(self);
        match self {
            Self::Sum(a, b) | Self::Product(a, b) | Self::Division(a, b) | Self::Outer(a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Self::Negation(a) | Self::Power(a, _) | Self::Math(_, a) | Self::Grad(a) | Self::Index(a, _) => {
                a.visit(f)
            }
            _ => {}
        }
    }

    /// The value shape of the expression, or an error if the operands of some operation have
    /// incompatible shapes.
    pub fn value_shape(&self) -> Result<Vec<usize>, Error> {
        match self {
            Self::Literal(_) => Ok(Vec::new()),
            Self::Constant(c) => Ok(c.shape().to_vec()),
            Self::Coefficient(function) => Ok(function.space().value_shape()),
            Self::Argument(space) => Ok(space.value_shape()),
            Self::SpatialCoordinate(_) => Ok(vec![2]),
            Self::Sum(a, b) => {
                let (sa, sb) = (a.value_shape()?, b.value_shape()?);
                if sa != sb {
                    return compilation_error(format!("can not add values of shapes {sa:?} and {sb:?}"));
                }
                Ok(sa)
            }
            Self::Negation(a) => a.value_shape(),
            Self::Product(a, b) => {
                let (sa, sb) = (a.value_shape()?, b.value_shape()?);
                match (sa.is_empty(), sb.is_empty()) {
                    (true, _) => Ok(sb),
                    (false, true) => Ok(sa),
                    (false, false) => compilation_error(format!(
                        "product of values with shapes {sa:?} and {sb:?} is not defined, \
                         at least one factor must be a scalar"
                    )),
                }
            }
            Self::Division(a, b) => {
                let sb = b.value_shape()?;
                if !sb.is_empty() {
                    return compilation_error(format!("can not divide by a value of shape {sb:?}"));
                }
                a.value_shape()
            }
            Self::Power(a, _) | Self::Math(_, a) => {
                let sa = a.value_shape()?;
                if !sa.is_empty() {
                    return compilation_error(format!(
                        "elementary functions are only defined for scalars, got shape {sa:?}"
                    ));
                }
                Ok(sa)
            }
            Self::Grad(a) => {
                let mut sa = a.value_shape()?;
                if sa.len() > 1 {
                    return compilation_error(format!("gradient of a value with shape {sa:?} is not supported"));
                }
                sa.push(2);
                Ok(sa)
            }
            Self::Outer(a, b) => {
                let (sa, sb) = (a.value_shape()?, b.value_shape()?);
                if sa.len() != 1 || sb.len() != 1 {
                    return compilation_error(format!(
                        "outer product needs two vectors, got shapes {sa:?} and {sb:?}"
                    ));
                }
                Ok(vec![sa[0], sb[0]])
            }
            Self::Index(a, i) => {
                let sa = a.value_shape()?;
                match sa.first() {
                    Some(n) if i < n => Ok(sa[1..].to_vec()),
                    _ => compilation_error(format!("index {i} is out of bounds for shape {sa:?}")),
                }
            }
        }
    }

    /// The number of arguments in each term of the expression, 0 or 1.
    ///
    /// Returns an error if the expression is not linear in its argument.
    pub fn argument_degree(&self) -> Result<usize, Error> {
        let degree = match self {
            Self::Argument(_) => 1,
            Self::Literal(_) | Self::Constant(_) | Self::Coefficient(_) | Self::SpatialCoordinate(_) => 0,
            Self::Sum(a, b) => {
                let (da, db) = (a.argument_degree()?, b.argument_degree()?);
                if da != db {
                    return compilation_error("sum of terms with and without argument is not linear");
                }
                da
            }
            Self::Negation(a) | Self::Grad(a) | Self::Index(a, _) => a.argument_degree()?,
            Self::Product(a, b) | Self::Outer(a, b) => a.argument_degree()? + b.argument_degree()?,
            Self::Division(a, b) => {
                if b.argument_degree()? > 0 {
                    return compilation_error("division by an argument is not linear");
                }
                a.argument_degree()?
            }
            Self::Power(a, _) | Self::Math(_, a) => {
                if a.argument_degree()? > 0 {
                    return compilation_error("elementary functions of an argument are not linear");
                }
                0
            }
        };
        if degree > 1 {
            return compilation_error("product of arguments is not linear");
        }
        Ok(degree)
    }

    /// Rewrites the expression so that gradients are only applied to coefficients and
    /// arguments.
    pub fn apply_derivatives(&self) -> Result<Self, Error> {
        Ok(match self {
            Self::Grad(a) => a.apply_derivatives()?.differentiate()?,
            Self::Sum(a, b) => a.apply_derivatives()? + b.apply_derivatives()?,
            Self::Negation(a) => -a.apply_derivatives()?,
            Self::Product(a, b) => a.apply_derivatives()? * b.apply_derivatives()?,
            Self::Division(a, b) => a.apply_derivatives()? / b.apply_derivatives()?,
            Self::Power(a, p) => a.apply_derivatives()?.powf(*p),
            Self::Math(function, a) => Self::Math(*function, Box::new(a.apply_derivatives()?)),
            Self::Outer(a, b) => a.apply_derivatives()?.outer(b.apply_derivatives()?),
            Self::Index(a, i) => a.apply_derivatives()?.index(*i),
            terminal => terminal.clone(),
        })
    }

    /// Gradient of an expression which contains no gradients other than those of terminals.
    fn differentiate(&self) -> Result<Self, Error> {
        let shape = self.value_shape()?;
        if shape.len() > 1 {
            return compilation_error(format!("gradient of a value with shape {shape:?} is not supported"));
        }
        let is_scalar = |e: &Self| e.value_shape().map(|s| s.is_empty());
        let zero_gradient = || {
            let mut grad_shape = shape.clone();
            grad_shape.push(2);
            Self::constant(Constant::zeros(grad_shape))
        };

        Ok(match self {
            Self::Literal(_) | Self::Constant(_) => zero_gradient(),
            Self::Coefficient(_) | Self::Argument(_) => self.clone().grad(),
            Self::SpatialCoordinate(_) => Self::constant(Constant::identity(2)),
            Self::Sum(a, b) => a.differentiate()? + b.differentiate()?,
            Self::Negation(a) => -a.differentiate()?,
            Self::Product(a, b) => {
                let (a, b) = (a.as_ref().clone(), b.as_ref().clone());
                match (is_scalar(&a)?, is_scalar(&b)?) {
                    (true, true) => a.differentiate()? * b.clone() + a * b.differentiate()?,
                    (true, false) => a.clone() * b.differentiate()? + b.outer(a.differentiate()?),
                    _ => b.clone() * a.differentiate()? + a.outer(b.differentiate()?),
                }
            }
            Self::Division(a, b) => {
                let (a, b) = (a.as_ref().clone(), b.as_ref().clone());
                let b_squared = b.clone() * b.clone();
                if is_scalar(&a)? {
                    (a.differentiate()? * b.clone() - a * b.differentiate()?) / b_squared
                } else {
                    a.differentiate()? / b.clone() - a.outer(b.differentiate()?) / b_squared
                }
            }
            Self::Power(a, p) => {
                let a = a.as_ref().clone();
                Self::Literal(*p) * a.clone().powf(*p - T::one()) * a.differentiate()?
            }
            Self::Math(function, a) => {
                let a = a.as_ref().clone();
                let da = a.differentiate()?;
                match function {
                    MathFunction::Sin => a.cos() * da,
                    MathFunction::Cos => -(a.sin() * da),
                    MathFunction::Exp => a.exp() * da,
                    MathFunction::Ln => da / a,
                    MathFunction::Sqrt => da / (Self::Literal(T::one() + T::one()) * a.sqrt()),
                }
            }
            Self::Grad(_) => return compilation_error("second derivatives are not supported"),
            Self::Outer(..) => return compilation_error("gradient of an outer product is not supported"),
            Self::Index(a, i) => a.differentiate()?.index(*i),
        })
    }
}

impl<T: Real> From<T> for Expr<T> {
    fn from(value: T) -> Self {
        Self::Literal(value)
    }
}

impl<T: Real> From<Constant<T>> for Expr<T> {
    fn from(constant: Constant<T>) -> Self {
        Self::constant(constant)
    }
}

impl<T: Real> From<Arc<Function<T>>> for Expr<T> {
    fn from(function: Arc<Function<T>>) -> Self {
        Self::Coefficient(function)
    }
}

impl<T: Real> Neg for Expr<T> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::Negation(Box::new(self))
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, |$a:ident, $b:ident| $body:expr) => {
        impl<T: Real> $trait for Expr<T> {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self {
                let ($a, $b) = (self, rhs);
                $body
            }
        }

        impl<T: Real> $trait<T> for Expr<T> {
            type Output = Self;

            fn $method(self, rhs: T) -> Self {
                let ($a, $b) = (self, Expr::Literal(rhs));
                $body
            }
        }
    };
}

impl_binary_op!(Add, add, |a, b| Expr::Sum(Box::new(a), Box::new(b)));
impl_binary_op!(Sub, sub, |a, b| Expr::Sum(Box::new(a), Box::new(-b)));
impl_binary_op!(Mul, mul, |a, b| Expr::Product(Box::new(a), Box::new(b)));
impl_binary_op!(Div, div, |a, b| Expr::Division(Box::new(a), Box::new(b)));
