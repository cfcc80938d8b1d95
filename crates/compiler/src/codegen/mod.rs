//! Code generation: lowers the typed AST to stack-machine bytecode.
//!
//! A `CodeGen` session owns one program's constant pool and function tables.
//! Generation runs in two passes — registration (so forward references and
//! self-recursion resolve), then body emission — and ends by sealing the
//! tables into a [`CompiledProgram`]. `generate` consumes the session, so a
//! sealed program can never grow another instruction.
//!
//! Type checking happens inline during emission: every expression visit
//! returns the static type it leaves on the stack, every statement visit
//! leaves the stack balanced.
//!
//! # Modules
//!
//! - `error`: fatal codegen diagnostics
//! - `program`: registration pass, body emission, sealing
//! - `statements`: statement lowering and forward-jump patching
//! - `expressions`: expression lowering, type rules, constant folding

mod error;
mod expressions;
mod program;
mod statements;

pub use error::CodegenError;

use std::collections::HashMap;

use mica_bytecode::{Function, Instruction, MAX_CODE_LEN, MAX_POOL_LEN, OpCode, Value};

use crate::ast::Type;
use crate::config::CompilerConfig;

/// Compile-time signature of a callable, tracked alongside the lowered
/// [`Function`] because `ValueType` cannot express pointee types.
#[derive(Debug, Clone)]
pub(super) struct Signature {
    pub params: Vec<Type>,
    pub return_type: Type,
    pub is_variadic: bool,
}

/// A sealed compilation result, ready for the encoder.
///
/// `extern_functions` never reach the artifact; the `CallFfi` operand is an
/// index into this table and the runtime agrees on its order out of band.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    pub constants: Vec<Value>,
    pub functions: Vec<Function>,
    pub extern_functions: Vec<Function>,
}

pub struct CodeGen {
    fold_constants: bool,
    constants: Vec<Value>,
    functions: Vec<Function>,
    signatures: Vec<Signature>,
    function_names: HashMap<String, usize>,
    extern_functions: Vec<Function>,
    extern_signatures: Vec<Signature>,
    extern_names: HashMap<String, usize>,
    /// Index of the function whose body is being emitted.
    current: Option<usize>,
    /// `(name, type)` per local slot of the current function; parameters
    /// occupy the lowest slots.
    locals: Vec<(String, Type)>,
}

impl CodeGen {
    pub fn new(config: &CompilerConfig) -> Self {
        CodeGen {
            fold_constants: config.fold_constants,
            constants: Vec::new(),
            functions: Vec::new(),
            signatures: Vec::new(),
            function_names: HashMap::new(),
            extern_functions: Vec::new(),
            extern_signatures: Vec::new(),
            extern_names: HashMap::new(),
            current: None,
            locals: Vec::new(),
        }
    }

    /// Intern a constant, deduplicating on `(type, payload)`.
    pub(super) fn add_constant(&mut self, value: Value) -> Result<u8, CodegenError> {
        if let Some(idx) = self.constants.iter().position(|c| *c == value) {
            return Ok(idx as u8);
        }
        if self.constants.len() >= MAX_POOL_LEN {
            return Err(CodegenError::ConstantPoolOverflow);
        }
        self.constants.push(value);
        Ok((self.constants.len() - 1) as u8)
    }

    /// Append an instruction to the current function and return its index.
    pub(super) fn emit(&mut self, opcode: OpCode, arg: u8) -> Result<usize, CodegenError> {
        let name = self.current_name().to_string();
        let code = self.current_code();
        if code.len() >= MAX_CODE_LEN {
            return Err(CodegenError::CodeLengthOverflow {
                function: name,
                detail: format!("more than {} instructions", MAX_CODE_LEN),
            });
        }
        code.push(Instruction::new(opcode, arg));
        Ok(code.len() - 1)
    }

    /// Current instruction index: the target a forward jump patches to.
    pub(super) fn cur_pos(&self) -> usize {
        let idx = self.current.expect("instruction position read outside a function body");
        self.functions[idx].code.len()
    }

    /// Write the target of a previously emitted jump hole.
    pub(super) fn patch_jump(&mut self, at: usize, target: usize) -> Result<(), CodegenError> {
        if target > u8::MAX as usize {
            return Err(CodegenError::CodeLengthOverflow {
                function: self.current_name().to_string(),
                detail: format!("jump target {} does not fit a one-byte operand", target),
            });
        }
        let code = self.current_code();
        debug_assert!(code[at].opcode.is_jump(), "patching a non-jump instruction");
        code[at].arg = target as u8;
        Ok(())
    }

    /// Allocate the next local slot. Scoping is flat per function.
    pub(super) fn add_local(
        &mut self,
        name: &str,
        ty: Type,
        line: usize,
        column: usize,
    ) -> Result<u8, CodegenError> {
        if self.find_local(name).is_some() {
            return Err(CodegenError::DuplicateName {
                name: name.to_string(),
                line,
                column,
            });
        }
        if self.locals.len() > u8::MAX as usize {
            return Err(CodegenError::CodeLengthOverflow {
                function: self.current_name().to_string(),
                detail: "more than 256 local slots".to_string(),
            });
        }
        self.locals.push((name.to_string(), ty));
        Ok((self.locals.len() - 1) as u8)
    }

    pub(super) fn find_local(&self, name: &str) -> Option<(u8, Type)> {
        self.locals
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| (i as u8, self.locals[i].1.clone()))
    }

    fn current_code(&mut self) -> &mut Vec<Instruction> {
        let idx = self.current.expect("instruction emitted outside a function body");
        &mut self.functions[idx].code
    }

    fn current_name(&self) -> &str {
        match self.current {
            Some(idx) => &self.functions[idx].name,
            None => "<none>",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Program;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use mica_bytecode::ValueType;

    fn parse(source: &str) -> Program {
        let (tokens, lex_errors) = Lexer::new(source).tokenize();
        assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
        Parser::new(tokens).parse().expect("parse failed")
    }

    fn generate(source: &str) -> CompiledProgram {
        CodeGen::new(&CompilerConfig::default())
            .generate(&parse(source))
            .expect("codegen failed")
    }

    fn generate_err(source: &str) -> CodegenError {
        CodeGen::new(&CompilerConfig::default())
            .generate(&parse(source))
            .expect_err("codegen succeeded")
    }

    fn ops(function: &Function) -> Vec<(OpCode, u8)> {
        function.code.iter().map(|i| (i.opcode, i.arg)).collect()
    }

    #[test]
    fn test_extern_and_empty_main() {
        let program = generate("extern print(string) -> none  fn main() -> none return end");
        assert!(program.constants.is_empty());
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.extern_functions.len(), 1);
        let main = &program.functions[0];
        assert_eq!(main.name, "main");
        assert_eq!(main.return_type, ValueType::None);
        assert_eq!(main.arity(), 0);
        assert_eq!(ops(main), vec![(OpCode::Ret, 0)]);
    }

    #[test]
    fn test_constant_folding_cascades() {
        let program = generate("fn main() -> int return 2 + 3 * 4 end");
        assert_eq!(program.constants, vec![Value::Int(14)]);
        assert_eq!(
            ops(&program.functions[0]),
            vec![(OpCode::LoadConst, 0), (OpCode::Ret, 0)]
        );
    }

    #[test]
    fn test_folding_can_be_disabled() {
        let config = CompilerConfig::new().with_constant_folding(false);
        let program = CodeGen::new(&config)
            .generate(&parse("fn main() -> int return 2 + 3 * 4 end"))
            .unwrap();
        assert_eq!(
            program.constants,
            vec![Value::Int(2), Value::Int(3), Value::Int(4)]
        );
        assert_eq!(
            ops(&program.functions[0]),
            vec![
                (OpCode::LoadConst, 0),
                (OpCode::LoadConst, 1),
                (OpCode::LoadConst, 2),
                (OpCode::MulI, 0),
                (OpCode::AddI, 0),
                (OpCode::Ret, 0),
            ]
        );
    }

    #[test]
    fn test_if_else_patching() {
        let program = generate("fn f(x: int) -> int if x == 0 then return 1 end return 2 end");
        let zero = Value::Int(0);
        let one = Value::Int(1);
        let two = Value::Int(2);
        assert_eq!(program.constants, vec![zero, one, two]);
        assert_eq!(
            ops(&program.functions[0]),
            vec![
                (OpCode::LoadVar, 0),
                (OpCode::LoadConst, 0),
                (OpCode::EqI, 0),
                (OpCode::Jz, 7),
                (OpCode::LoadConst, 1),
                (OpCode::Ret, 0),
                (OpCode::Jmp, 7),
                (OpCode::LoadConst, 2),
                (OpCode::Ret, 0),
            ]
        );
    }

    #[test]
    fn test_if_with_else_branch() {
        let program =
            generate("fn f(x: int) -> int if x == 0 then return 1 else return 2 end end");
        assert_eq!(
            ops(&program.functions[0]),
            vec![
                (OpCode::LoadVar, 0),
                (OpCode::LoadConst, 0),
                (OpCode::EqI, 0),
                (OpCode::Jz, 7),
                (OpCode::LoadConst, 1),
                (OpCode::Ret, 0),
                (OpCode::Jmp, 9),
                (OpCode::LoadConst, 2),
                (OpCode::Ret, 0),
            ]
        );
    }

    #[test]
    fn test_while_patching() {
        // while i < 10 then i = i + 1 end
        let program =
            generate("fn f() -> none var i: int = 0 while i < 10 then i = i + 1 end return end");
        let f = &program.functions[0];
        // constants: 0, 10, 1
        assert_eq!(
            program.constants,
            vec![Value::Int(0), Value::Int(10), Value::Int(1)]
        );
        assert_eq!(
            ops(f),
            vec![
                (OpCode::LoadConst, 0), // 0: var i = 0
                (OpCode::StoreVar, 0),  // 1
                (OpCode::LoadVar, 0),   // 2: loop head (cond)
                (OpCode::LoadConst, 1), // 3
                (OpCode::LtI, 0),       // 4
                (OpCode::Jz, 11),       // 5: exit, past the back-jump
                (OpCode::LoadVar, 0),   // 6: i + 1
                (OpCode::LoadConst, 2), // 7
                (OpCode::AddI, 0),      // 8
                (OpCode::StoreVar, 0),  // 9
                (OpCode::Jmp, 2),       // 10 -> head
                (OpCode::Ret, 0),       // 11
            ]
        );
    }

    #[test]
    fn test_pointer_roundtrip() {
        let program = generate(
            "fn main() -> int var x: int = 5 var p: pointer(int) = &x *p = 7 return x end",
        );
        let code = ops(&program.functions[0]);
        let load_addrs: Vec<_> = code.iter().filter(|(op, _)| *op == OpCode::LoadAddr).collect();
        let store_derefs: Vec<_> = code
            .iter()
            .filter(|(op, _)| *op == OpCode::StoreDeref)
            .collect();
        assert_eq!(load_addrs, vec![&(OpCode::LoadAddr, 0)]);
        assert_eq!(store_derefs.len(), 1);
        // Final load of x returns int.
        assert_eq!(program.functions[0].return_type, ValueType::Int);
        assert_eq!(code[code.len() - 2], (OpCode::LoadVar, 0));
    }

    #[test]
    fn test_variadic_ffi_call() {
        let program = generate(
            "extern printf(...) -> none fn main() -> none printf(\"hi\", 1, 2) return end",
        );
        let main = &program.functions[0];
        // Arguments are emitted right-to-left: 2, 1, "hi".
        assert_eq!(program.constants[0], Value::Int(2));
        assert_eq!(program.constants[1], Value::Int(1));
        assert_eq!(program.constants[2], Value::Str("hi".into()));
        assert_eq!(
            ops(main),
            vec![
                (OpCode::LoadConst, 0),
                (OpCode::LoadConst, 1),
                (OpCode::LoadConst, 2),
                (OpCode::CallFfi, 0),
                (OpCode::Ret, 0),
            ]
        );
        assert!(program.extern_functions[0].is_variadic);
    }

    #[test]
    fn test_duplicate_variable() {
        let err = generate_err("fn f() -> none var a: int = 1 var a: int = 2 return end");
        assert!(matches!(err, CodegenError::DuplicateName { name, .. } if name == "a"));
    }

    #[test]
    fn test_duplicate_function() {
        let err = generate_err("fn f() -> none return end fn f() -> none return end");
        assert!(matches!(err, CodegenError::DuplicateName { name, .. } if name == "f"));
    }

    #[test]
    fn test_constant_deduplication() {
        let program = generate("fn f() -> int var a: int = 7 var b: int = 7 return 7 end");
        assert_eq!(program.constants, vec![Value::Int(7)]);
    }

    #[test]
    fn test_unknown_variable() {
        let err = generate_err("fn f() -> int return y end");
        assert!(matches!(err, CodegenError::UnknownName { name, .. } if name == "y"));
    }

    #[test]
    fn test_unknown_function() {
        let err = generate_err("fn f() -> none g() end");
        assert!(matches!(err, CodegenError::UnknownName { name, .. } if name == "g"));
    }

    #[test]
    fn test_arity_mismatch() {
        let err = generate_err(
            "fn g(a: int) -> none return end fn f() -> none g(1, 2) return end",
        );
        assert!(matches!(
            err,
            CodegenError::ArityMismatch {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_argument_type_mismatch() {
        let err =
            generate_err("fn g(a: int) -> none return end fn f() -> none g(1.5) return end");
        assert!(matches!(err, CodegenError::TypeMismatch { .. }));
    }

    #[test]
    fn test_call_arguments_reversed_with_checks() {
        let program = generate(
            "fn g(a: int, b: float) -> none return end fn f() -> none g(1, 2.5) return end",
        );
        let f = &program.functions[1];
        // 2.5 first, then 1, then Call 0 (g registered first).
        assert_eq!(program.constants[0], Value::Float(2.5));
        assert_eq!(program.constants[1], Value::Int(1));
        assert_eq!(
            ops(f),
            vec![
                (OpCode::LoadConst, 0),
                (OpCode::LoadConst, 1),
                (OpCode::Call, 0),
                (OpCode::Ret, 0),
            ]
        );
    }

    #[test]
    fn test_forward_reference_and_recursion() {
        let program = generate(
            "fn even(n: int) -> int return odd(n - 1) end fn odd(n: int) -> int return even(n - 1) end",
        );
        let even = &program.functions[0];
        // odd is function index 1, called before its body exists.
        assert!(ops(even).contains(&(OpCode::Call, 1)));
    }

    #[test]
    fn test_self_recursion() {
        let program = generate("fn loop(n: int) -> int return loop(n - 1) end");
        assert!(ops(&program.functions[0]).contains(&(OpCode::Call, 0)));
    }

    #[test]
    fn test_condition_must_be_bool() {
        let err = generate_err("fn f() -> none if 1 then return end end");
        assert!(matches!(err, CodegenError::TypeMismatch { expected, .. } if expected == "bool"));
    }

    #[test]
    fn test_assignment_type_mismatch() {
        let err = generate_err("fn f() -> none var x: int = 1 x = 2.5 end");
        assert!(matches!(err, CodegenError::TypeMismatch { .. }));
    }

    #[test]
    fn test_deref_of_non_pointer() {
        let err = generate_err("fn f() -> none var x: int = 1 var y: int = *x end");
        assert!(matches!(err, CodegenError::DerefOfNonPointer { .. }));
    }

    #[test]
    fn test_address_of_non_variable() {
        let err = generate_err("fn f() -> none var p: pointer(int) = &(1 + 2) end");
        assert!(matches!(err, CodegenError::AddressOfNonVariable { .. }));
    }

    #[test]
    fn test_pointer_arithmetic() {
        let program = generate(
            "fn f() -> none var x: int = 1 var p: pointer(int) = &x var q: pointer(int) = p + 1 return end",
        );
        let f = &program.functions[0];
        // p + 1 lowers to the int add.
        assert!(ops(f).contains(&(OpCode::AddI, 0)));
    }

    #[test]
    fn test_unary_minus_emission() {
        let program = generate("fn f(x: int) -> int return -x end");
        assert_eq!(
            ops(&program.functions[0]),
            vec![
                (OpCode::LoadVar, 0),
                (OpCode::LoadConst, 0), // 0
                (OpCode::Swap, 0),
                (OpCode::SubI, 0),
                (OpCode::Ret, 0),
            ]
        );
        assert_eq!(program.constants, vec![Value::Int(0)]);
    }

    #[test]
    fn test_not_requires_bool() {
        let err = generate_err("fn f() -> bool return !1 end");
        assert!(matches!(err, CodegenError::TypeMismatch { .. }));
        let program = generate("fn f(b: bool) -> bool return !b end");
        assert!(ops(&program.functions[0]).contains(&(OpCode::NotB, 0)));
    }

    #[test]
    fn test_cast_int_to_float() {
        let program = generate("fn f(x: int) -> float return x as float end");
        assert!(ops(&program.functions[0]).contains(&(OpCode::CastIToF, 0)));
    }

    #[test]
    fn test_cast_float_to_int() {
        let program = generate("fn f(x: float) -> int return x as int end");
        assert!(ops(&program.functions[0]).contains(&(OpCode::CastFToI, 0)));
    }

    #[test]
    fn test_same_type_cast_is_noop() {
        let program = generate("fn f(x: int) -> int return x as int end");
        assert_eq!(
            ops(&program.functions[0]),
            vec![(OpCode::LoadVar, 0), (OpCode::Ret, 0)]
        );
    }

    #[test]
    fn test_invalid_cast() {
        let err = generate_err("fn f(s: string) -> int return s as int end");
        assert!(matches!(err, CodegenError::TypeMismatch { .. }));
    }

    #[test]
    fn test_type_literal_loads_ordinal() {
        let program = generate("fn f() -> int return #string end");
        assert_eq!(program.constants, vec![Value::Int(ValueType::Str as i64)]);
        assert_eq!(
            ops(&program.functions[0]),
            vec![(OpCode::LoadConst, 0), (OpCode::Ret, 0)]
        );
    }

    #[test]
    fn test_implicit_ret_appended() {
        let program = generate("fn f() -> none end");
        assert_eq!(ops(&program.functions[0]), vec![(OpCode::Ret, 0)]);
    }

    #[test]
    fn test_float_arithmetic_opcodes() {
        let program = generate("fn f(a: float, b: float) -> float return a / b end");
        assert!(ops(&program.functions[0]).contains(&(OpCode::DivF, 0)));
    }

    #[test]
    fn test_mixed_arithmetic_rejected() {
        let err = generate_err("fn f(a: int, b: float) -> int return a + b end");
        assert!(matches!(err, CodegenError::TypeMismatch { .. }));
    }

    #[test]
    fn test_division_by_literal_zero_is_not_folded() {
        let program = generate("fn f() -> int return 1 / 0 end");
        assert!(ops(&program.functions[0]).contains(&(OpCode::DivI, 0)));
        assert_eq!(program.constants, vec![Value::Int(1), Value::Int(0)]);
    }

    #[test]
    fn test_comparison_folding() {
        let program = generate("fn f() -> bool return 2 < 3 end");
        assert_eq!(program.constants, vec![Value::Bool(true)]);
    }

    #[test]
    fn test_float_folding() {
        let program = generate("fn f() -> float return 1.5 + 2.5 end");
        assert_eq!(program.constants, vec![Value::Float(4.0)]);
    }

    #[test]
    fn test_param_slots_precede_var_slots() {
        let program = generate(
            "fn f(a: int, b: int) -> int var c: int = 0 c = a + b return c end",
        );
        let f = &program.functions[0];
        // c occupies slot 2, after parameters a (0) and b (1).
        assert!(ops(f).contains(&(OpCode::StoreVar, 2)));
        assert_eq!(f.arity(), 2);
    }

    #[test]
    fn test_extern_call_uses_call_ffi() {
        let program = generate(
            "extern put(int) -> none fn main() -> none put(1) return end",
        );
        // put resolves through the extern table -> CallFfi, not Call.
        assert!(ops(&program.functions[0]).contains(&(OpCode::CallFfi, 0)));
    }

    #[test]
    fn test_slot_indices_within_bounds() {
        let program = generate(
            "fn f(a: int) -> int var b: int = a while b < 10 then b = b + a end return b end",
        );
        // Two locals: the parameter a and the var b.
        for function in &program.functions {
            for instr in &function.code {
                match instr.opcode {
                    OpCode::LoadVar | OpCode::StoreVar | OpCode::LoadAddr => {
                        assert!((instr.arg as usize) < 2);
                    }
                    OpCode::LoadConst => {
                        assert!((instr.arg as usize) < program.constants.len());
                    }
                    OpCode::Jmp | OpCode::Jz | OpCode::Jnz | OpCode::Jif => {
                        assert!((instr.arg as usize) <= function.code.len());
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn test_string_literal_interning() {
        let program = generate(
            "extern print(string) -> none fn main() -> none print(\"hi\") print(\"hi\") return end",
        );
        assert_eq!(program.constants, vec![Value::Str("hi".into())]);
    }

    #[test]
    fn test_null_literal() {
        let program = generate("fn f() -> none return null end");
        assert_eq!(program.constants, vec![Value::None]);
    }

    #[test]
    fn test_var_init_type_checked() {
        let err = generate_err("fn f() -> none var x: int = 1.5 end");
        assert!(matches!(err, CodegenError::TypeMismatch { .. }));
    }

    #[test]
    fn test_var_initializer_cannot_reference_itself() {
        let err = generate_err("fn f() -> none var x: int = x end");
        assert!(matches!(err, CodegenError::UnknownName { name, .. } if name == "x"));
    }

    #[test]
    fn test_store_through_pointer_type_checked() {
        let err = generate_err(
            "fn f() -> none var x: int = 1 var p: pointer(int) = &x *p = 1.5 end",
        );
        assert!(matches!(err, CodegenError::TypeMismatch { .. }));
    }
}
