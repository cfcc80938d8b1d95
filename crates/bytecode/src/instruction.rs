//! Instruction set for the Mica stack machine.
//!
//! Every instruction is a fixed two-byte pair `(opcode, arg)`. Opcodes are
//! typed where the runtime representation matters (`AddI` vs `AddF`) and
//! untyped where it does not (`LoadVar`, `StoreVar`). Jump arguments are
//! instruction indices within the enclosing function, never byte offsets.

use std::fmt;

/// Operation codes, ordinal-identified.
///
/// The discriminants are the encoded opcode bytes; the grouping below is the
/// wire order. Reordering variants is a wire-format break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // Control
    Nop = 0,
    Halt,
    /// Unconditional jump to instruction index `arg`.
    Jmp,
    /// Jump if top of stack is zero.
    Jz,
    /// Jump if top of stack is nonzero.
    Jnz,
    /// Jump if top of stack is true (bool).
    Jif,
    /// Call function `arg` in the function table.
    Call,
    Ret,
    TailCall,
    /// Call foreign function `arg` in the extern table.
    CallFfi,

    // Stack
    Dup,
    Swap,
    /// Push constant `arg` from the pool.
    LoadConst,

    // Typed arithmetic
    AddI,
    AddF,
    SubI,
    SubF,
    MulI,
    MulF,
    DivI,
    DivF,
    ModI,

    // Logical (bool)
    AndB,
    OrB,
    NotB,
    XorB,

    // Bitwise (int)
    ShlI,
    ShrI,
    BitAndI,
    BitOrI,
    BitXorI,

    // Typed comparison; all push a bool
    EqI,
    EqF,
    NeqI,
    NeqF,
    GtI,
    GtF,
    LtI,
    LtF,
    GeI,
    GeF,
    LeI,
    LeF,

    // Locals; `arg` is the slot index
    LoadVar,
    StoreVar,

    // Pointers
    /// Push the address of local slot `arg`.
    LoadAddr,
    Deref,
    StoreDeref,

    // Heap
    AllocI,
    AllocF,
    FreeI,
    FreeF,

    // Casts
    CastIToF,
    CastFToI,
}

impl OpCode {
    /// Look up an opcode by its encoded byte.
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        use OpCode::*;
        const OPS: [OpCode; 54] = [
            Nop, Halt, Jmp, Jz, Jnz, Jif, Call, Ret, TailCall, CallFfi, Dup, Swap, LoadConst,
            AddI, AddF, SubI, SubF, MulI, MulF, DivI, DivF, ModI, AndB, OrB, NotB, XorB, ShlI,
            ShrI, BitAndI, BitOrI, BitXorI, EqI, EqF, NeqI, NeqF, GtI, GtF, LtI, LtF, GeI, GeF,
            LeI, LeF, LoadVar, StoreVar, LoadAddr, Deref, StoreDeref, AllocI, AllocF, FreeI,
            FreeF, CastIToF, CastFToI,
        ];
        OPS.get(byte as usize).copied()
    }

    /// True for opcodes whose argument is a jump target.
    pub fn is_jump(self) -> bool {
        matches!(self, OpCode::Jmp | OpCode::Jz | OpCode::Jnz | OpCode::Jif)
    }

    /// True for opcodes that carry a meaningful argument byte.
    pub fn has_arg(self) -> bool {
        matches!(
            self,
            OpCode::Jmp
                | OpCode::Jz
                | OpCode::Jnz
                | OpCode::Jif
                | OpCode::Call
                | OpCode::CallFfi
                | OpCode::LoadConst
                | OpCode::LoadVar
                | OpCode::StoreVar
                | OpCode::LoadAddr
        )
    }
}

/// A single encoded instruction: opcode plus one unsigned byte argument.
///
/// Instructions without a meaningful argument encode `arg = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: OpCode,
    pub arg: u8,
}

impl Instruction {
    pub fn new(opcode: OpCode, arg: u8) -> Self {
        Instruction { opcode, arg }
    }

    /// An instruction with no argument.
    pub fn bare(opcode: OpCode) -> Self {
        Instruction { opcode, arg: 0 }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.opcode.has_arg() {
            write!(f, "{:?} {}", self.opcode, self.arg)
        } else {
            write!(f, "{:?}", self.opcode)
        }
    }
}
