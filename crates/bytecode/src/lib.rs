//! Mica bytecode: data model, binary encoder, and decoder.
//!
//! This crate defines what a compiled Mica program *is* — a deduplicated
//! constant pool plus a table of stack-machine functions — and how that pair
//! is serialized to the compact binary artifact the VM loads. The compiler
//! crate produces these structures; anything that executes or inspects an
//! artifact starts from the decoder here.
//!
//! # Modules
//!
//! - `value`: `ValueType` tags and tagged `Value` payloads
//! - `instruction`: the ordinal-identified `OpCode` set and `Instruction` pairs
//! - `function`: `Function` (signature + code vector)
//! - `encode`: artifact writer (rejects programs the format cannot describe)
//! - `decode`: artifact reader; authoritative for the wire format

pub mod decode;
pub mod encode;
pub mod function;
pub mod instruction;
pub mod value;

pub use decode::{DecodeError, decode, decode_from_slice};
pub use encode::{EncodeError, MAX_POOL_LEN, encode, encode_to_vec};
pub use function::{Function, MAX_ARITY, MAX_CODE_LEN};
pub use instruction::{Instruction, OpCode};
pub use value::{Value, ValueType};
