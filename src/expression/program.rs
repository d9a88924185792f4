//! Lowering of symbolic expressions to a flat instruction list.
//!
//! Every intermediate value lives in a slot of a scratch buffer. A slot holds a tensor of `size`
//! components, each of which is either a single number or, for values that depend linearly on
//! the argument, one number per argument dof (`width`). Values are stored component-major,
//! `slot[c * width + d]`.
use crate::error::Error;
use crate::expr::{Expr, MathFunction};
use crate::function::Function;
use crate::mesh::Mesh;
use crate::space::FunctionSpace;
use crate::Real;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub offset: usize,
    pub size: usize,
    pub width: usize,
}

impl Slot {
    pub fn len(&self) -> usize {
        self.size * self.width
    }
}

/// Per-point input data of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    /// Entries of the packed constant array, starting at the given offset.
    Constant(usize),
    Coefficient(usize),
    CoefficientGradient(usize),
    Argument,
    ArgumentGradient,
    SpatialCoordinate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Instruction<T> {
    Load { out: usize, source: Source },
    Add { out: usize, a: usize, b: usize },
    Negate { out: usize, a: usize },
    Scale { out: usize, scalar: usize, tensor: usize },
    Divide { out: usize, a: usize, b: usize },
    Power { out: usize, a: usize, exponent: T },
    Math { out: usize, function: MathFunction, a: usize },
    Outer { out: usize, a: usize, b: usize },
    /// Copies the components of `a` starting at `first`.
    Extract { out: usize, a: usize, first: usize },
}

/// A coefficient referenced by a program, with the derivatives it needs.
#[derive(Debug, Clone)]
pub(crate) struct CoefficientUse<T: Real> {
    pub function: Arc<Function<T>>,
    pub gradients: bool,
}

/// The argument space referenced by a program.
#[derive(Debug, Clone)]
pub(crate) struct ArgumentUse<T: Real> {
    pub space: Arc<FunctionSpace<T>>,
    pub gradients: bool,
}

/// A straight-line program evaluating an expression at a single point.
#[derive(Debug, Clone)]
pub(crate) struct Program<T: Real> {
    pub slots: Vec<Slot>,
    pub instructions: Vec<Instruction<T>>,
    pub constants: Vec<T>,
    pub coefficients: Vec<CoefficientUse<T>>,
    pub argument: Option<ArgumentUse<T>>,
    pub mesh: Option<Arc<Mesh<T>>>,
    pub value_shape: Vec<usize>,
    pub result: usize,
    pub scratch_len: usize,
}

impl<T: Real> Program<T> {
    /// Compiles an expression. Gradients must already have been applied with
    /// [`Expr::apply_derivatives`].
    pub fn compile(expr: &Expr<T>) -> Result<Self, Error> {
        let value_shape = expr.value_shape()?;
        expr.argument_degree()?;

        let mut program = Self {
            slots: Vec::new(),
            instructions: Vec::new(),
            constants: Vec::new(),
            coefficients: Vec::new(),
            argument: None,
            mesh: None,
            value_shape,
            result: 0,
            scratch_len: 0,
        };
        program.result = program.lower(expr)?;
        Ok(program)
    }

    pub fn argument_width(&self) -> usize {
        self.argument
            .as_ref()
            .map(|argument| argument.space.element().num_local_dofs())
            .unwrap_or(1)
    }

    fn allocate(&mut self, size: usize, width: usize) -> usize {
        self.slots.push(Slot {
            offset: self.scratch_len,
            size,
            width,
        });
        self.scratch_len += size * width;
        self.slots.len() - 1
    }

    fn push(&mut self, instruction: Instruction<T>) -> usize {
        let out = match instruction {
            Instruction::Load { out, .. }
            | Instruction::Add { out, .. }
            | Instruction::Negate { out, .. }
            | Instruction::Scale { out, .. }
            | Instruction::Divide { out, .. }
            | Instruction::Power { out, .. }
            | Instruction::Math { out, .. }
            | Instruction::Outer { out, .. }
            | Instruction::Extract { out, .. } => out,
        };
        self.instructions.push(instruction);
        out
    }

    fn register_mesh(&mut self, mesh: &Arc<Mesh<T>>) -> Result<(), Error> {
        match &self.mesh {
            Some(existing) if !Arc::ptr_eq(existing, mesh) => Err(Error::Compilation(
                "expression references functions defined on different meshes".to_string(),
            )),
            Some(_) => Ok(()),
            None => {
                self.mesh = Some(Arc::clone(mesh));
                Ok(())
            }
        }
    }

    fn register_coefficient(&mut self, function: &Arc<Function<T>>, gradients: bool) -> Result<usize, Error> {
        self.register_mesh(function.space().mesh())?;
        let existing = self
            .coefficients
            .iter()
            .position(|c| Arc::ptr_eq(&c.function, function));
        Ok(match existing {
            Some(index) => {
                self.coefficients[index].gradients |= gradients;
                index
            }
            None => {
                self.coefficients.push(CoefficientUse {
                    function: Arc::clone(function),
                    gradients,
                });
                self.coefficients.len() - 1
            }
        })
    }

    fn register_argument(&mut self, space: &Arc<FunctionSpace<T>>, gradients: bool) -> Result<usize, Error> {
        self.register_mesh(space.mesh())?;
        if let Some(argument) = &mut self.argument {
            if !Arc::ptr_eq(&argument.space, space) {
                return Err(Error::Compilation(
                    "expression contains arguments from more than one function space".to_string(),
                ));
            }
            argument.gradients |= gradients;
        } else {
            self.argument = Some(ArgumentUse {
                space: Arc::clone(space),
                gradients,
            });
        }
        Ok(space.element().num_local_dofs())
    }

    fn load_constant(&mut self, values: &[T]) -> usize {
        let offset = self.constants.len();
        self.constants.extend_from_slice(values);
        let out = self.allocate(values.len(), 1);
        self.push(Instruction::Load {
            out,
            source: Source::Constant(offset),
        })
    }

    fn lower(&mut self, expr: &Expr<T>) -> Result<usize, Error> {
        let size: usize = expr.value_shape()?.iter().product();
        match expr {
            Expr::Literal(value) => Ok(self.load_constant(&[*value])),
            Expr::Constant(constant) => Ok(self.load_constant(constant.value())),
            Expr::Coefficient(function) => {
                let index = self.register_coefficient(function, false)?;
                let out = self.allocate(size, 1);
                Ok(self.push(Instruction::Load {
                    out,
                    source: Source::Coefficient(index),
                }))
            }
            Expr::Argument(space) => {
                let width = self.register_argument(space, false)?;
                let out = self.allocate(size, width);
                Ok(self.push(Instruction::Load {
                    out,
                    source: Source::Argument,
                }))
            }
            Expr::SpatialCoordinate(mesh) => {
                self.register_mesh(mesh)?;
                let out = self.allocate(size, 1);
                Ok(self.push(Instruction::Load {
                    out,
                    source: Source::SpatialCoordinate,
                }))
            }
            Expr::Grad(a) => match a.as_ref() {
                Expr::Coefficient(function) => {
                    let index = self.register_coefficient(function, true)?;
                    let out = self.allocate(size, 1);
                    Ok(self.push(Instruction::Load {
                        out,
                        source: Source::CoefficientGradient(index),
                    }))
                }
                Expr::Argument(space) => {
                    let width = self.register_argument(space, true)?;
                    let out = self.allocate(size, width);
                    Ok(self.push(Instruction::Load {
                        out,
                        source: Source::ArgumentGradient,
                    }))
                }
                other => Err(Error::Compilation(format!(
                    "gradient of {other:?} must be eliminated before lowering"
                ))),
            },
            Expr::Sum(a, b) => {
                let (a, b) = (self.lower(a)?, self.lower(b)?);
                let out = self.allocate(size, self.slots[a].width);
                Ok(self.push(Instruction::Add { out, a, b }))
            }
            Expr::Negation(a) => {
                let a = self.lower(a)?;
                let out = self.allocate(size, self.slots[a].width);
                Ok(self.push(Instruction::Negate { out, a }))
            }
            Expr::Product(a, b) => {
                let (a, b) = (self.lower(a)?, self.lower(b)?);
                let width = self.slots[a].width.max(self.slots[b].width);
                let (scalar, tensor) = if self.slots[a].size == 1 { (a, b) } else { (b, a) };
                let out = self.allocate(size, width);
                Ok(self.push(Instruction::Scale { out, scalar, tensor }))
            }
            Expr::Division(a, b) => {
                let (a, b) = (self.lower(a)?, self.lower(b)?);
                let out = self.allocate(size, self.slots[a].width);
                Ok(self.push(Instruction::Divide { out, a, b }))
            }
            Expr::Power(a, exponent) => {
                let a = self.lower(a)?;
                let out = self.allocate(1, 1);
                Ok(self.push(Instruction::Power {
                    out,
                    a,
                    exponent: *exponent,
                }))
            }
            Expr::Math(function, a) => {
                let a = self.lower(a)?;
                let out = self.allocate(1, 1);
                Ok(self.push(Instruction::Math {
                    out,
                    function: *function,
                    a,
                }))
            }
            Expr::Outer(a, b) => {
                let (a, b) = (self.lower(a)?, self.lower(b)?);
                let width = self.slots[a].width.max(self.slots[b].width);
                let out = self.allocate(size, width);
                Ok(self.push(Instruction::Outer { out, a, b }))
            }
            Expr::Index(a, i) => {
                let a = self.lower(a)?;
                let width = self.slots[a].width;
                let out = self.allocate(size, width);
                Ok(self.push(Instruction::Extract { out, a, first: i * size }))
            }
        }
    }

    /// Runs the program. `load` copies the data of a source into the given output buffer.
    pub fn execute(&self, scratch: &mut [T], mut load: impl FnMut(Source, &mut [T])) {
        let at = |width: usize, d: usize| if width == 1 { 0 } else { d };
        for instruction in &self.instructions {
            match *instruction {
                Instruction::Load { out, source } => {
                    let slot = self.slots[out];
                    let out = &mut scratch[slot.offset..slot.offset + slot.len()];
                    match source {
                        Source::Constant(offset) => out.copy_from_slice(&self.constants[offset..offset + slot.len()]),
                        source => load(source, out),
                    }
                }
                Instruction::Add { out, a, b } => {
                    let (input, out, slot) = split(scratch, &self.slots, out);
                    let (a, b) = (&input[self.range(a)], &input[self.range(b)]);
                    for i in 0..slot.len() {
                        out[i] = a[i] + b[i];
                    }
                }
                Instruction::Negate { out, a } => {
                    let (input, out, _) = split(scratch, &self.slots, out);
                    for (o, a) in out.iter_mut().zip(&input[self.range(a)]) {
                        *o = -*a;
                    }
                }
                Instruction::Scale { out, scalar, tensor } => {
                    let (input, out, slot) = split(scratch, &self.slots, out);
                    let (ws, wt) = (self.slots[scalar].width, self.slots[tensor].width);
                    let (s, t) = (&input[self.range(scalar)], &input[self.range(tensor)]);
                    for c in 0..slot.size {
                        for d in 0..slot.width {
                            out[c * slot.width + d] = s[at(ws, d)] * t[c * wt + at(wt, d)];
                        }
                    }
                }
                Instruction::Divide { out, a, b } => {
                    let (input, out, _) = split(scratch, &self.slots, out);
                    let denominator = input[self.slots[b].offset];
                    for (o, a) in out.iter_mut().zip(&input[self.range(a)]) {
                        *o = *a / denominator;
                    }
                }
                Instruction::Power { out, a, exponent } => {
                    let (input, out, _) = split(scratch, &self.slots, out);
                    out[0] = input[self.slots[a].offset].powf(exponent);
                }
                Instruction::Math { out, function, a } => {
                    let (input, out, _) = split(scratch, &self.slots, out);
                    out[0] = function.apply(input[self.slots[a].offset]);
                }
                Instruction::Outer { out, a, b } => {
                    let (input, out, slot) = split(scratch, &self.slots, out);
                    let (sa, sb) = (self.slots[a], self.slots[b]);
                    let (a, b) = (&input[self.range(a)], &input[self.range(b)]);
                    for i in 0..sa.size {
                        for j in 0..sb.size {
                            for d in 0..slot.width {
                                out[(i * sb.size + j) * slot.width + d] =
                                    a[i * sa.width + at(sa.width, d)] * b[j * sb.width + at(sb.width, d)];
                            }
                        }
                    }
                }
                Instruction::Extract { out, a, first } => {
                    let (input, out, slot) = split(scratch, &self.slots, out);
                    let begin = self.slots[a].offset + first * slot.width;
                    out.copy_from_slice(&input[begin..begin + slot.len()]);
                }
            }
        }
    }

    /// The values of the result slot after [`Program::execute`].
    pub fn result<'a>(&self, scratch: &'a [T]) -> &'a [T] {
        &scratch[self.range(self.result)]
    }

    fn range(&self, slot: usize) -> std::ops::Range<usize> {
        let slot = self.slots[slot];
        slot.offset..slot.offset + slot.len()
    }
}

/// Splits the scratch buffer into the slots preceding `out` and the output slot itself.
///
/// Operands are always lowered before the instruction that consumes them, so they are stored in
/// the first part.
fn split<'a, T>(scratch: &'a mut [T], slots: &[Slot], out: usize) -> (&'a [T], &'a mut [T], Slot) {
    let slot = slots[out];
    let (input, rest) = scratch.split_at_mut(slot.offset);
    (input, &mut rest[..slot.len()], slot)
}
