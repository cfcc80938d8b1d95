//! Statement lowering, including the forward-jump patching for `if` and
//! `while`.
//!
//! Every statement leaves the stack balanced. Jumps are emitted with a
//! placeholder argument ("patch hole") and written back once the target
//! instruction index is known; both structured emitters below patch every
//! hole they open before returning, so no unpatched jump can survive into a
//! sealed function.

use mica_bytecode::OpCode;

use crate::ast::{Expr, Stmt, StmtKind, Type};

use super::{CodeGen, CodegenError};

impl CodeGen {
    pub(super) fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.emit_expr(expr)?;
                Ok(())
            }
            StmtKind::VarDecl {
                name,
                ty,
                initializer,
            } => self.emit_var_decl(name, ty, initializer.as_ref(), stmt.line, stmt.column),
            StmtKind::Return(value) => {
                if let Some(expr) = value {
                    self.emit_expr(expr)?;
                }
                self.emit(OpCode::Ret, 0)?;
                Ok(())
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.emit_if(condition, then_branch, else_branch.as_deref()),
            StmtKind::While { condition, body } => self.emit_while(condition, body),
        }
    }

    fn emit_var_decl(
        &mut self,
        name: &str,
        ty: &Type,
        initializer: Option<&Expr>,
        line: usize,
        column: usize,
    ) -> Result<(), CodegenError> {
        if self.find_local(name).is_some() {
            return Err(CodegenError::DuplicateName {
                name: name.to_string(),
                line,
                column,
            });
        }

        match initializer {
            Some(init) => {
                // The initializer is emitted before the slot exists, so a
                // declaration cannot read itself.
                let init_ty = self.emit_expr(init)?;
                if init_ty != *ty {
                    return Err(CodegenError::TypeMismatch {
                        expected: ty.to_string(),
                        found: init_ty.to_string(),
                        line: init.line,
                        column: init.column,
                    });
                }
                let slot = self.add_local(name, ty.clone(), line, column)?;
                self.emit(OpCode::StoreVar, slot)?;
            }
            None => {
                self.add_local(name, ty.clone(), line, column)?;
            }
        }
        Ok(())
    }

    /// `if cond then A else B end`:
    ///
    /// ```text
    ///       <cond>
    ///       Jz   J1      ; hole
    ///       <A>
    ///       Jmp  J2      ; hole
    /// J1:   <B>
    /// J2:
    /// ```
    fn emit_if(
        &mut self,
        condition: &Expr,
        then_branch: &[Stmt],
        else_branch: Option<&[Stmt]>,
    ) -> Result<(), CodegenError> {
        self.emit_condition(condition)?;
        let jz = self.emit(OpCode::Jz, 0)?;

        for stmt in then_branch {
            self.emit_stmt(stmt)?;
        }
        let jmp = self.emit(OpCode::Jmp, 0)?;

        let else_start = self.cur_pos();
        self.patch_jump(jz, else_start)?;

        if let Some(stmts) = else_branch {
            for stmt in stmts {
                self.emit_stmt(stmt)?;
            }
        }

        let end = self.cur_pos();
        self.patch_jump(jmp, end)?;
        Ok(())
    }

    /// `while cond then B end`:
    ///
    /// ```text
    /// H:    <cond>
    ///       Jz   J1      ; hole
    ///       <B>
    ///       Jmp  H
    /// J1:
    /// ```
    fn emit_while(&mut self, condition: &Expr, body: &[Stmt]) -> Result<(), CodegenError> {
        let head = self.cur_pos();
        self.emit_condition(condition)?;
        let jz = self.emit(OpCode::Jz, 0)?;

        for stmt in body {
            self.emit_stmt(stmt)?;
        }

        if head > u8::MAX as usize {
            return Err(CodegenError::CodeLengthOverflow {
                function: self.current_name().to_string(),
                detail: format!("loop head {} does not fit a one-byte operand", head),
            });
        }
        self.emit(OpCode::Jmp, head as u8)?;

        let end = self.cur_pos();
        self.patch_jump(jz, end)?;
        Ok(())
    }

    fn emit_condition(&mut self, condition: &Expr) -> Result<(), CodegenError> {
        let ty = self.emit_expr(condition)?;
        if ty != Type::Bool {
            return Err(CodegenError::TypeMismatch {
                expected: Type::Bool.to_string(),
                found: ty.to_string(),
                line: condition.line,
                column: condition.column,
            });
        }
        Ok(())
    }
}
