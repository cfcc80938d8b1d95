//! Binary decoder for the bytecode artifact.
//!
//! The decoder is the authoritative reference for the wire format: for every
//! well-formed `(constants, functions)` pair, `decode(encode(x)) == x`
//! (modulo function names, which are never serialized). Unlike the encoder's
//! input, the decoder's input is untrusted, so every read is bounds-checked
//! and every tag validated.

use std::fmt;
use std::io::{self, Read};

use crate::function::Function;
use crate::instruction::{Instruction, OpCode};
use crate::value::{Value, ValueType};

#[derive(Debug)]
pub enum DecodeError {
    /// Input ended in the middle of a field.
    UnexpectedEof,
    /// A constant carried a byte that names no type tag.
    InvalidTypeTag(u8),
    /// An instruction carried a byte that names no opcode.
    InvalidOpcode(u8),
    /// A bool payload was neither 0 nor 1.
    InvalidBool(u8),
    /// A string's outer length disagreed with its inner length.
    StringLengthMismatch { outer: u32, inner: u32 },
    /// String payload was not valid UTF-8.
    InvalidUtf8,
    Io(io::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "unexpected end of bytecode"),
            DecodeError::InvalidTypeTag(tag) => write!(f, "invalid constant type tag {:#04x}", tag),
            DecodeError::InvalidOpcode(byte) => write!(f, "invalid opcode {:#04x}", byte),
            DecodeError::InvalidBool(byte) => write!(f, "invalid bool payload {:#04x}", byte),
            DecodeError::StringLengthMismatch { outer, inner } => write!(
                f,
                "string length fields disagree: outer {} != 4 + inner {}",
                outer, inner
            ),
            DecodeError::InvalidUtf8 => write!(f, "string constant is not valid UTF-8"),
            DecodeError::Io(e) => write!(f, "read failed: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::UnexpectedEof
        } else {
            DecodeError::Io(e)
        }
    }
}

/// Deserialize a bytecode artifact back into `(constants, functions)`.
///
/// Decoded functions carry empty names.
pub fn decode<R: Read>(input: &mut R) -> Result<(Vec<Value>, Vec<Function>), DecodeError> {
    let const_count = read_u8(input)?;
    let mut constants = Vec::with_capacity(const_count as usize);
    for _ in 0..const_count {
        constants.push(decode_constant(input)?);
    }

    let func_count = read_u8(input)?;
    let mut functions = Vec::with_capacity(func_count as usize);
    for _ in 0..func_count {
        functions.push(decode_function(input)?);
    }

    Ok((constants, functions))
}

/// Deserialize from an in-memory buffer.
pub fn decode_from_slice(bytes: &[u8]) -> Result<(Vec<Value>, Vec<Function>), DecodeError> {
    decode(&mut io::Cursor::new(bytes))
}

fn decode_constant<R: Read>(input: &mut R) -> Result<Value, DecodeError> {
    let tag = read_u8(input)?;
    let ty = ValueType::from_u8(tag).ok_or(DecodeError::InvalidTypeTag(tag))?;
    let value = match ty {
        ValueType::Int => Value::Int(i64::from_le_bytes(read_array(input)?)),
        ValueType::Float => Value::Float(f64::from_le_bytes(read_array(input)?)),
        ValueType::Bool => match read_u8(input)? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => return Err(DecodeError::InvalidBool(other)),
        },
        ValueType::Str => {
            let outer = u32::from_le_bytes(read_array(input)?);
            let inner = u32::from_le_bytes(read_array(input)?);
            if outer != inner.wrapping_add(4) {
                return Err(DecodeError::StringLengthMismatch { outer, inner });
            }
            let mut bytes = vec![0u8; inner as usize];
            input.read_exact(&mut bytes)?;
            Value::Str(String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?)
        }
        ValueType::None => Value::None,
        ValueType::List => Value::List,
        ValueType::Struct => Value::Struct,
        ValueType::Pointer => Value::Pointer,
    };
    Ok(value)
}

fn decode_function<R: Read>(input: &mut R) -> Result<Function, DecodeError> {
    let ret_tag = read_u8(input)?;
    let return_type = ValueType::from_u8(ret_tag).ok_or(DecodeError::InvalidTypeTag(ret_tag))?;

    let argc = read_u8(input)?;
    let mut arg_types = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        let tag = read_u8(input)?;
        arg_types.push(ValueType::from_u8(tag).ok_or(DecodeError::InvalidTypeTag(tag))?);
    }

    let code_len = u16::from_le_bytes(read_array(input)?);
    let mut function = Function::new("", arg_types, return_type, false);
    function.code.reserve(code_len as usize);
    for _ in 0..code_len {
        let byte = read_u8(input)?;
        let opcode = OpCode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte))?;
        let arg = read_u8(input)?;
        function.code.push(Instruction::new(opcode, arg));
    }

    Ok(function)
}

fn read_u8<R: Read>(input: &mut R) -> Result<u8, DecodeError> {
    let mut byte = [0u8; 1];
    input.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn read_array<R: Read, const N: usize>(input: &mut R) -> Result<[u8; N], DecodeError> {
    let mut bytes = [0u8; N];
    input.read_exact(&mut bytes)?;
    Ok(bytes)
}
