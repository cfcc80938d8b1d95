//! Program-level passes: function registration, body emission, sealing.

use mica_bytecode::{Function, MAX_ARITY, MAX_POOL_LEN, OpCode};

use crate::ast::{FunctionDecl, Program};

use super::{CodeGen, CodegenError, CompiledProgram, Signature};

impl CodeGen {
    /// Lower a whole program.
    ///
    /// Pass one registers every declaration so calls can resolve regardless
    /// of declaration order; pass two emits the non-extern bodies. The
    /// session is consumed: the returned tables are sealed.
    pub fn generate(mut self, program: &Program) -> Result<CompiledProgram, CodegenError> {
        for decl in &program.decls {
            self.register_function(decl)?;
        }

        for decl in &program.decls {
            if !decl.is_extern {
                self.emit_function_body(decl)?;
            }
        }

        Ok(CompiledProgram {
            constants: self.constants,
            functions: self.functions,
            extern_functions: self.extern_functions,
        })
    }

    fn register_function(&mut self, decl: &FunctionDecl) -> Result<(), CodegenError> {
        if self.function_names.contains_key(&decl.name)
            || self.extern_names.contains_key(&decl.name)
        {
            return Err(CodegenError::DuplicateName {
                name: decl.name.clone(),
                line: decl.line,
                column: decl.column,
            });
        }
        if decl.params.len() > MAX_ARITY {
            return Err(CodegenError::CodeLengthOverflow {
                function: decl.name.clone(),
                detail: format!("more than {} parameters", MAX_ARITY),
            });
        }

        let arg_types = decl.params.iter().map(|p| p.ty.value_type()).collect();
        let function = Function::new(
            decl.name.clone(),
            arg_types,
            decl.return_type.value_type(),
            decl.is_variadic,
        );
        let signature = Signature {
            params: decl.params.iter().map(|p| p.ty.clone()).collect(),
            return_type: decl.return_type.clone(),
            is_variadic: decl.is_variadic,
        };

        if decl.is_extern {
            if self.extern_functions.len() >= MAX_POOL_LEN {
                return Err(CodegenError::FunctionTableOverflow);
            }
            self.extern_names
                .insert(decl.name.clone(), self.extern_functions.len());
            self.extern_functions.push(function);
            self.extern_signatures.push(signature);
        } else {
            if self.functions.len() >= MAX_POOL_LEN {
                return Err(CodegenError::FunctionTableOverflow);
            }
            self.function_names
                .insert(decl.name.clone(), self.functions.len());
            self.functions.push(function);
            self.signatures.push(signature);
        }

        Ok(())
    }

    fn emit_function_body(&mut self, decl: &FunctionDecl) -> Result<(), CodegenError> {
        let idx = self.function_names[&decl.name];
        self.current = Some(idx);
        self.locals = decl
            .params
            .iter()
            .map(|p| (p.name.clone(), p.ty.clone()))
            .collect();

        for stmt in &decl.body {
            self.emit_stmt(stmt)?;
        }

        // A body that falls off its end still has to return.
        let needs_ret = self.functions[idx]
            .code
            .last()
            .is_none_or(|instr| instr.opcode != OpCode::Ret);
        if needs_ret {
            self.emit(OpCode::Ret, 0)?;
        }

        self.current = None;
        self.locals.clear();
        Ok(())
    }
}
