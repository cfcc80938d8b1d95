//! Expression lowering: type rules, opcode selection, constant folding.
//!
//! Every emitter here leaves exactly one value on the operand stack and
//! returns its static type; the statement layer relies on that contract.

use mica_bytecode::{OpCode, Value, ValueType};

use crate::ast::{BinaryOp, Expr, ExprKind, Literal, Type, UnaryOp};

use super::{CodeGen, CodegenError};

impl CodeGen {
    pub(super) fn emit_expr(&mut self, expr: &Expr) -> Result<Type, CodegenError> {
        match &expr.kind {
            ExprKind::Literal(literal) => self.emit_literal(literal),
            ExprKind::Variable(name) => self.emit_variable(name, expr.line, expr.column),
            ExprKind::TypeLiteral(name) => self.emit_type_literal(name, expr.line, expr.column),
            ExprKind::Call { callee, args } => {
                self.emit_call(callee, args, expr.line, expr.column)
            }
            ExprKind::Unary { op, right } => self.emit_unary(*op, right, expr.line, expr.column),
            ExprKind::Binary { left, op, right } => {
                self.emit_binary(left, *op, right, expr.line, expr.column)
            }
            ExprKind::Assignment { target, value } => {
                self.emit_assignment(target, value, expr.line, expr.column)
            }
        }
    }

    fn emit_literal(&mut self, literal: &Literal) -> Result<Type, CodegenError> {
        let (value, ty) = literal_value(literal);
        let idx = self.add_constant(value)?;
        self.emit(OpCode::LoadConst, idx)?;
        Ok(ty)
    }

    fn emit_variable(
        &mut self,
        name: &str,
        line: usize,
        column: usize,
    ) -> Result<Type, CodegenError> {
        let (slot, ty) = self.find_local(name).ok_or_else(|| CodegenError::UnknownName {
            name: name.to_string(),
            line,
            column,
        })?;
        self.emit(OpCode::LoadVar, slot)?;
        Ok(ty)
    }

    /// `#int`, `#string`, ... load the named type's runtime tag as an int
    /// constant.
    fn emit_type_literal(
        &mut self,
        name: &str,
        line: usize,
        column: usize,
    ) -> Result<Type, CodegenError> {
        let tag = type_name_tag(name).ok_or_else(|| CodegenError::UnknownName {
            name: name.to_string(),
            line,
            column,
        })?;
        let idx = self.add_constant(Value::Int(tag as i64))?;
        self.emit(OpCode::LoadConst, idx)?;
        Ok(Type::Int)
    }

    fn emit_call(
        &mut self,
        callee: &str,
        args: &[Expr],
        line: usize,
        column: usize,
    ) -> Result<Type, CodegenError> {
        // Externs shadow regular functions on lookup.
        let (idx, signature, is_extern) = if let Some(&i) = self.extern_names.get(callee) {
            (i, self.extern_signatures[i].clone(), true)
        } else if let Some(&i) = self.function_names.get(callee) {
            (i, self.signatures[i].clone(), false)
        } else {
            return Err(CodegenError::UnknownName {
                name: callee.to_string(),
                line,
                column,
            });
        };

        if !signature.is_variadic && args.len() != signature.params.len() {
            return Err(CodegenError::ArityMismatch {
                name: callee.to_string(),
                expected: signature.params.len(),
                found: args.len(),
                line,
                column,
            });
        }

        // Rightmost argument first, so it ends up lowest on the stack.
        for (i, arg) in args.iter().enumerate().rev() {
            let arg_ty = self.emit_expr(arg)?;
            if !signature.is_variadic && arg_ty != signature.params[i] {
                return Err(CodegenError::TypeMismatch {
                    expected: signature.params[i].to_string(),
                    found: arg_ty.to_string(),
                    line: arg.line,
                    column: arg.column,
                });
            }
        }

        let opcode = if is_extern { OpCode::CallFfi } else { OpCode::Call };
        self.emit(opcode, idx as u8)?;
        Ok(signature.return_type)
    }

    fn emit_unary(
        &mut self,
        op: UnaryOp,
        right: &Expr,
        line: usize,
        column: usize,
    ) -> Result<Type, CodegenError> {
        match op {
            UnaryOp::Neg => {
                let ty = self.emit_expr(right)?;
                if !ty.is_scalar() {
                    return Err(CodegenError::TypeMismatch {
                        expected: "int or float".to_string(),
                        found: ty.to_string(),
                        line,
                        column,
                    });
                }
                // Negation is 0 - x; the zero is pushed after the operand,
                // so swap before subtracting.
                let zero = match ty {
                    Type::Int => Value::Int(0),
                    Type::Float => Value::Float(0.0),
                    _ => unreachable!("scalar check above"),
                };
                let idx = self.add_constant(zero)?;
                self.emit(OpCode::LoadConst, idx)?;
                self.emit(OpCode::Swap, 0)?;
                self.emit(sub_opcode(&ty), 0)?;
                Ok(ty)
            }
            UnaryOp::Not => {
                let ty = self.emit_expr(right)?;
                if ty != Type::Bool {
                    return Err(CodegenError::TypeMismatch {
                        expected: Type::Bool.to_string(),
                        found: ty.to_string(),
                        line,
                        column,
                    });
                }
                self.emit(OpCode::NotB, 0)?;
                Ok(Type::Bool)
            }
            UnaryOp::AddrOf => {
                let ExprKind::Variable(name) = &right.kind else {
                    return Err(CodegenError::AddressOfNonVariable { line, column });
                };
                let (slot, ty) =
                    self.find_local(name).ok_or_else(|| CodegenError::UnknownName {
                        name: name.clone(),
                        line: right.line,
                        column: right.column,
                    })?;
                self.emit(OpCode::LoadAddr, slot)?;
                Ok(Type::Pointer(Box::new(ty)))
            }
            UnaryOp::Deref => {
                let ty = self.emit_expr(right)?;
                match ty {
                    Type::Pointer(inner) => {
                        self.emit(OpCode::Deref, 0)?;
                        Ok(*inner)
                    }
                    other => Err(CodegenError::DerefOfNonPointer {
                        found: other,
                        line,
                        column,
                    }),
                }
            }
        }
    }

    fn emit_binary(
        &mut self,
        left: &Expr,
        op: BinaryOp,
        right: &Expr,
        line: usize,
        column: usize,
    ) -> Result<Type, CodegenError> {
        if op == BinaryOp::As {
            return self.emit_cast(left, right, line, column);
        }

        if self.fold_constants {
            if let Some(folded) = fold_binary_tree(left, op, right) {
                let ty = value_static_type(&folded);
                let idx = self.add_constant(folded)?;
                self.emit(OpCode::LoadConst, idx)?;
                return Ok(ty);
            }
        }

        let left_ty = self.emit_expr(left)?;
        let right_ty = self.emit_expr(right)?;

        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                // Pointer arithmetic: pointer +/- int keeps the pointer type
                // and runs on the int unit.
                if matches!(left_ty, Type::Pointer(_)) && right_ty == Type::Int {
                    self.emit(arith_opcode(op, &Type::Int), 0)?;
                    return Ok(left_ty);
                }
                if matches!(right_ty, Type::Pointer(_)) && left_ty == Type::Int {
                    self.emit(arith_opcode(op, &Type::Int), 0)?;
                    return Ok(right_ty);
                }
                if left_ty == right_ty && left_ty.is_scalar() {
                    self.emit(arith_opcode(op, &left_ty), 0)?;
                    return Ok(left_ty);
                }
                Err(CodegenError::TypeMismatch {
                    expected: left_ty.to_string(),
                    found: right_ty.to_string(),
                    line,
                    column,
                })
            }
            BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Gt => {
                if left_ty == right_ty && left_ty.is_scalar() {
                    self.emit(cmp_opcode(op, &left_ty), 0)?;
                    return Ok(Type::Bool);
                }
                Err(CodegenError::TypeMismatch {
                    expected: left_ty.to_string(),
                    found: right_ty.to_string(),
                    line,
                    column,
                })
            }
            BinaryOp::As => unreachable!("casts handled above"),
        }
    }

    /// `value as type`. Only the int/float conversions exist as instructions;
    /// a same-type cast vanishes.
    fn emit_cast(
        &mut self,
        value: &Expr,
        target: &Expr,
        line: usize,
        column: usize,
    ) -> Result<Type, CodegenError> {
        let ExprKind::TypeLiteral(name) = &target.kind else {
            return Err(CodegenError::UnsupportedOperator {
                op: "as".to_string(),
                line,
                column,
            });
        };

        let value_ty = self.emit_expr(value)?;
        match (value_ty.clone(), name.as_str()) {
            (Type::Int, "float") => {
                self.emit(OpCode::CastIToF, 0)?;
                Ok(Type::Float)
            }
            (Type::Float, "int") => {
                self.emit(OpCode::CastFToI, 0)?;
                Ok(Type::Int)
            }
            (Type::Int, "int") | (Type::Float, "float") => Ok(value_ty),
            (Type::Str, "string") | (Type::Bool, "bool") | (Type::None, "none") => Ok(value_ty),
            (Type::Pointer(_), "pointer") => Ok(value_ty),
            _ => Err(CodegenError::TypeMismatch {
                expected: name.clone(),
                found: value_ty.to_string(),
                line,
                column,
            }),
        }
    }

    fn emit_assignment(
        &mut self,
        target: &Expr,
        value: &Expr,
        line: usize,
        column: usize,
    ) -> Result<Type, CodegenError> {
        match &target.kind {
            ExprKind::Variable(name) => {
                let (slot, declared) =
                    self.find_local(name).ok_or_else(|| CodegenError::UnknownName {
                        name: name.clone(),
                        line: target.line,
                        column: target.column,
                    })?;
                let value_ty = self.emit_expr(value)?;
                if value_ty != declared {
                    return Err(CodegenError::TypeMismatch {
                        expected: declared.to_string(),
                        found: value_ty.to_string(),
                        line: value.line,
                        column: value.column,
                    });
                }
                self.emit(OpCode::StoreVar, slot)?;
                Ok(value_ty)
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                right: pointer,
            } => {
                // RHS first, then the address, then the store.
                let value_ty = self.emit_expr(value)?;
                let pointee = match self.emit_expr(pointer)? {
                    Type::Pointer(pointee) => pointee,
                    other => {
                        return Err(CodegenError::DerefOfNonPointer {
                            found: other,
                            line: pointer.line,
                            column: pointer.column,
                        });
                    }
                };
                if value_ty != *pointee {
                    return Err(CodegenError::TypeMismatch {
                        expected: pointee.to_string(),
                        found: value_ty.to_string(),
                        line: value.line,
                        column: value.column,
                    });
                }
                self.emit(OpCode::StoreDeref, 0)?;
                Ok(value_ty)
            }
            _ => Err(CodegenError::InvalidAssignmentTarget { line, column }),
        }
    }
}

fn literal_value(literal: &Literal) -> (Value, Type) {
    match literal {
        Literal::Int(v) => (Value::Int(*v), Type::Int),
        Literal::Float(v) => (Value::Float(*v), Type::Float),
        Literal::Str(v) => (Value::Str(v.clone()), Type::Str),
        Literal::Bool(v) => (Value::Bool(*v), Type::Bool),
        Literal::Null => (Value::None, Type::None),
    }
}

fn value_static_type(value: &Value) -> Type {
    match value {
        Value::Int(_) => Type::Int,
        Value::Float(_) => Type::Float,
        Value::Bool(_) => Type::Bool,
        other => unreachable!("folding never produces {:?}", other),
    }
}

fn type_name_tag(name: &str) -> Option<ValueType> {
    let tag = match name {
        "int" => ValueType::Int,
        "float" => ValueType::Float,
        "string" => ValueType::Str,
        "bool" => ValueType::Bool,
        "none" => ValueType::None,
        "pointer" => ValueType::Pointer,
        _ => return None,
    };
    Some(tag)
}

fn arith_opcode(op: BinaryOp, ty: &Type) -> OpCode {
    match (op, ty) {
        (BinaryOp::Add, Type::Int) => OpCode::AddI,
        (BinaryOp::Add, Type::Float) => OpCode::AddF,
        (BinaryOp::Sub, Type::Int) => OpCode::SubI,
        (BinaryOp::Sub, Type::Float) => OpCode::SubF,
        (BinaryOp::Mul, Type::Int) => OpCode::MulI,
        (BinaryOp::Mul, Type::Float) => OpCode::MulF,
        (BinaryOp::Div, Type::Int) => OpCode::DivI,
        (BinaryOp::Div, Type::Float) => OpCode::DivF,
        _ => unreachable!("arith opcode for {:?} {:?}", op, ty),
    }
}

fn cmp_opcode(op: BinaryOp, ty: &Type) -> OpCode {
    match (op, ty) {
        (BinaryOp::Eq, Type::Int) => OpCode::EqI,
        (BinaryOp::Eq, Type::Float) => OpCode::EqF,
        (BinaryOp::Neq, Type::Int) => OpCode::NeqI,
        (BinaryOp::Neq, Type::Float) => OpCode::NeqF,
        (BinaryOp::Lt, Type::Int) => OpCode::LtI,
        (BinaryOp::Lt, Type::Float) => OpCode::LtF,
        (BinaryOp::Gt, Type::Int) => OpCode::GtI,
        (BinaryOp::Gt, Type::Float) => OpCode::GtF,
        _ => unreachable!("cmp opcode for {:?} {:?}", op, ty),
    }
}

fn sub_opcode(ty: &Type) -> OpCode {
    match ty {
        Type::Int => OpCode::SubI,
        Type::Float => OpCode::SubF,
        _ => unreachable!("sub opcode for {:?}", ty),
    }
}

/// Fold a binary node whose operand trees bottom out in same-typed scalar
/// literals. Folding recurses first, so `2 + 3 * 4` collapses to a single
/// `14` and only the final value is interned.
fn fold_binary_tree(left: &Expr, op: BinaryOp, right: &Expr) -> Option<Value> {
    let l = fold_operand(left)?;
    let r = fold_operand(right)?;
    fold_values(op, l, r)
}

fn fold_operand(expr: &Expr) -> Option<Value> {
    match &expr.kind {
        ExprKind::Literal(Literal::Int(v)) => Some(Value::Int(*v)),
        ExprKind::Literal(Literal::Float(v)) => Some(Value::Float(*v)),
        ExprKind::Binary { left, op, right } => fold_binary_tree(left, *op, right),
        _ => None,
    }
}

fn fold_values(op: BinaryOp, left: Value, right: Value) -> Option<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            let value = match op {
                BinaryOp::Add => Value::Int(a.wrapping_add(b)),
                BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
                BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
                // A zero divisor is left for the runtime to trap.
                BinaryOp::Div if b == 0 => return None,
                BinaryOp::Div => Value::Int(a.wrapping_div(b)),
                BinaryOp::Eq => Value::Bool(a == b),
                BinaryOp::Neq => Value::Bool(a != b),
                BinaryOp::Lt => Value::Bool(a < b),
                BinaryOp::Gt => Value::Bool(a > b),
                BinaryOp::As => return None,
            };
            Some(value)
        }
        (Value::Float(a), Value::Float(b)) => {
            let value = match op {
                BinaryOp::Add => Value::Float(a + b),
                BinaryOp::Sub => Value::Float(a - b),
                BinaryOp::Mul => Value::Float(a * b),
                BinaryOp::Div => Value::Float(a / b),
                BinaryOp::Eq => Value::Bool(a == b),
                BinaryOp::Neq => Value::Bool(a != b),
                BinaryOp::Lt => Value::Bool(a < b),
                BinaryOp::Gt => Value::Bool(a > b),
                BinaryOp::As => return None,
            };
            Some(value)
        }
        // Mixed operand types never fold; emission reports the mismatch.
        _ => None,
    }
}
