//! Compiled function model.

use std::fmt;

use crate::instruction::Instruction;
use crate::value::ValueType;

/// Hard cap on a function's code vector: the encoding stores the length as
/// a little-endian `u16`.
pub const MAX_CODE_LEN: usize = u16::MAX as usize;

/// Hard cap on arity: the encoding stores the argument count as a `u8`.
pub const MAX_ARITY: usize = u8::MAX as usize;

/// A compiled function: signature plus code.
///
/// Extern (FFI) functions share this shape with an empty code vector; they
/// live in a separate table and are never serialized. `name` exists for
/// diagnostics and disassembly only and is not part of the wire format.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub arg_types: Vec<ValueType>,
    pub return_type: ValueType,
    pub code: Vec<Instruction>,
    pub is_variadic: bool,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        arg_types: Vec<ValueType>,
        return_type: ValueType,
        is_variadic: bool,
    ) -> Self {
        Function {
            name: name.into(),
            arg_types,
            return_type,
            code: Vec::new(),
            is_variadic,
        }
    }

    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }
}

// The name never round-trips through the encoding, so identity is the
// signature plus the code.
impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.arg_types == other.arg_types
            && self.return_type == other.return_type
            && self.code == other.code
            && self.is_variadic == other.is_variadic
    }
}

impl Eq for Function {}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        if self.is_variadic {
            write!(f, "...")?;
        } else {
            for (i, ty) in self.arg_types.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", ty)?;
            }
        }
        writeln!(f, ") -> {}", self.return_type)?;
        for (idx, instr) in self.code.iter().enumerate() {
            writeln!(f, "  {:4}  {}", idx, instr)?;
        }
        Ok(())
    }
}
