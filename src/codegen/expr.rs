//! Expression emission. Every expression leaves its value in `AX`; far
//! pointers additionally carry their segment in `DX`.

use anyhow::Result;

use super::CodeGen;
use crate::ast::{AssignOp, BinOp, Expr, Literal, UnaryOp};
use crate::types::{type_of, TypeInfo};

impl CodeGen<'_> {
    fn ty_of(&self, expr: &Expr) -> TypeInfo {
        type_of(expr, self.symbols, self.structs)
    }

    pub(super) fn gen_expression(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Literal(lit) => self.gen_literal(lit),
            Expr::Ident(name) => {
                let name = name.clone();
                self.gen_ident_load(&name);
                Ok(())
            }
            Expr::Binary { op, lhs, rhs } => self.gen_binary(*op, lhs, rhs),
            Expr::Unary { op, operand } => self.gen_unary(op, operand),
            Expr::Assign { op, target, value } => {
                self.gen_assignment(*op, target, value)
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let else_label = self.make_label("tern_else");
                let end_label = self.make_label("tern_end");
                self.gen_expression(cond)?;
                self.ins("test ax, ax ; ternary condition");
                self.ins(format!("jz {else_label}"));
                self.gen_expression(then_expr)?;
                self.ins(format!("jmp {end_label}"));
                self.label(&else_label);
                self.gen_expression(else_expr)?;
                self.label(&end_label);
                Ok(())
            }
            Expr::Call { name, args } => self.gen_call(name, args),
            Expr::Member {
                arrow,
                base,
                member,
            } => self.gen_member_load(*arrow, base, member),
        }
    }

    fn gen_literal(&mut self, lit: &Literal) -> Result<()> {
        match lit {
            Literal::Int(value) => {
                self.ins(format!("mov ax, {value} ; load literal"));
            }
            Literal::Char(value) => {
                self.ins(format!("mov al, {value} ; load character value"));
                self.ins("mov ah, 0 ; zero-extend to 16-bit");
            }
            Literal::Bool(value) => {
                self.ins(format!(
                    "mov ax, {} ; load boolean value ({})",
                    *value as u8,
                    if *value { "true" } else { "false" }
                ));
            }
            Literal::Str(raw) => {
                let raw = raw.clone();
                let index = self.intern_string(&raw);
                self.ins(format!("; string literal: \"{raw}\""));
                self.ins(format!(
                    "mov ax, string_{index} ; address of string"
                ));
            }
            Literal::FarPtr { segment, offset } => {
                self.ins(format!("mov dx, 0x{segment:04X} ; segment"));
                self.ins(format!("mov ax, 0x{offset:04X} ; offset"));
            }
        }
        Ok(())
    }

    fn gen_ident_load(&mut self, name: &str) {
        if self.frame.is_param(name) {
            let offset = -self.frame.offset(name);
            self.ins(format!("mov ax, [bp+{offset}] ; load parameter {name}"));
            return;
        }
        let offset = self.frame.offset(name);
        if offset != 0 {
            self.ins(format!(
                "mov ax, [bp-{offset}] ; load local variable {name}"
            ));
            return;
        }
        // no frame slot: a global
        let ty = self.symbols.lookup(name).cloned().unwrap_or_default();
        if ty.array {
            let label = self.array_label_for(name);
            self.ins(format!("mov ax, {label} ; address of array {name}"));
        } else if ty.far_pointer && ty.pointer > 0 {
            let label = self.global_label(name);
            self.ins(format!("mov ax, [{label}] ; far pointer offset"));
            self.ins(format!("mov dx, [{label}+2] ; far pointer segment"));
        } else if ty.is_byte() {
            let label = self.global_label(name);
            self.ins(format!("mov al, [{label}] ; load global variable {name}"));
            self.ins("mov ah, 0");
        } else {
            let label = self.global_label(name);
            self.ins(format!("mov ax, [{label}] ; load global variable {name}"));
        }
    }

    fn gen_ident_store(&mut self, name: &str) {
        if self.frame.is_param(name) {
            let offset = -self.frame.offset(name);
            self.ins(format!(
                "mov [bp+{offset}], ax ; store in parameter {name}"
            ));
            return;
        }
        let offset = self.frame.offset(name);
        if offset != 0 {
            self.ins(format!(
                "mov [bp-{offset}], ax ; store in local variable {name}"
            ));
            return;
        }
        let ty = self.symbols.lookup(name).cloned().unwrap_or_default();
        let label = self.global_label(name);
        if ty.is_byte() {
            self.ins(format!("mov [{label}], al ; store in global {name}"));
        } else if ty.far_pointer && ty.pointer > 0 {
            self.ins(format!("mov [{label}], ax ; far pointer offset"));
            self.ins(format!("mov [{label}+2], dx ; far pointer segment"));
        } else {
            self.ins(format!("mov [{label}], ax ; store in global {name}"));
        }
    }

    fn array_label_for(&self, name: &str) -> String {
        self.array_labels
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("_{name}"))
    }

    fn gen_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<()> {
        match op {
            BinOp::Comma => {
                // left evaluated for effect, right is the value
                self.gen_expression(lhs)?;
                self.gen_expression(rhs)?;
                return Ok(());
            }
            BinOp::LogicalAnd => {
                let false_label = self.make_label("land_false");
                let end_label = self.make_label("land_end");
                self.gen_expression(lhs)?;
                self.ins("test ax, ax ; logical AND left test");
                self.ins(format!("jz {false_label} ; left false, skip right"));
                self.gen_expression(rhs)?;
                self.ins("test ax, ax ; logical AND right test");
                self.ins(format!("jz {false_label} ; right false, result false"));
                self.ins("mov ax, 1 ; both true");
                self.ins(format!("jmp {end_label}"));
                self.label(&false_label);
                self.ins("mov ax, 0 ; false");
                self.label(&end_label);
                return Ok(());
            }
            BinOp::LogicalOr => {
                let true_label = self.make_label("lor_true");
                let end_label = self.make_label("lor_end");
                self.gen_expression(lhs)?;
                self.ins("test ax, ax ; logical OR left test");
                self.ins(format!("jnz {true_label} ; left true, result true"));
                self.gen_expression(rhs)?;
                self.ins("test ax, ax ; logical OR right test");
                self.ins(format!("jnz {true_label} ; right true, result true"));
                self.ins("mov ax, 0 ; both false");
                self.ins(format!("jmp {end_label}"));
                self.label(&true_label);
                self.ins("mov ax, 1 ; true");
                self.label(&end_label);
                return Ok(());
            }
            _ => {}
        }

        self.gen_expression(lhs)?;
        self.ins("push ax ; save left operand");
        self.gen_expression(rhs)?;
        self.ins("mov bx, ax ; right operand to bx");
        self.ins("pop ax ; restore left operand");

        let left_ty = self.ty_of(lhs);
        let right_ty = self.ty_of(rhs);

        match op {
            BinOp::Add => {
                if left_ty.is_pointer() {
                    if left_ty.stride() > 1 {
                        self.ins("; pointer arithmetic: scale by element size 2");
                        self.ins("shl bx, 1 ; scale index for word elements");
                    }
                } else if right_ty.is_pointer() {
                    if right_ty.stride() > 1 {
                        self.ins("; pointer arithmetic: scale by element size 2");
                        self.ins("shl ax, 1 ; scale index for word elements");
                    }
                    self.ins("xchg ax, bx ; put pointer in ax");
                }
                self.ins("add ax, bx ; addition");
            }
            BinOp::Sub => {
                if left_ty.is_pointer() && right_ty.is_pointer() {
                    self.ins("; pointer difference");
                    self.ins("sub ax, bx ; raw byte difference");
                    if left_ty.stride() > 1 {
                        self.ins("sar ax, 1 ; divide by element size");
                    }
                } else if left_ty.is_pointer() {
                    if left_ty.stride() > 1 {
                        self.ins("; pointer arithmetic: scale by element size 2");
                        self.ins("shl bx, 1 ; scale index for word elements");
                    }
                    self.ins("sub ax, bx ; subtraction");
                } else {
                    self.ins("sub ax, bx ; subtraction");
                }
            }
            BinOp::Mul => self.ins("imul bx ; multiplication (signed)"),
            BinOp::Div => {
                if left_ty.base.is_unsigned() {
                    self.ins("mov dx, 0 ; clear dx for unsigned division");
                    self.ins("div bx ; division (unsigned)");
                } else {
                    self.ins("cwd ; sign extend ax into dx:ax");
                    self.ins("idiv bx ; division (signed)");
                }
            }
            BinOp::Mod => {
                if left_ty.base.is_unsigned() {
                    self.ins("mov dx, 0 ; clear dx for unsigned division");
                    self.ins("div bx ; division (unsigned)");
                } else {
                    self.ins("cwd ; sign extend ax into dx:ax");
                    self.ins("idiv bx ; division (signed)");
                }
                self.ins("mov ax, dx ; remainder is in dx");
            }
            BinOp::Eq => self.gen_comparison("eq", "je"),
            BinOp::Ne => self.gen_comparison("neq", "jne"),
            BinOp::Lt => self.gen_comparison("lt", "jl"),
            BinOp::Le => self.gen_comparison("lte", "jle"),
            BinOp::Gt => self.gen_comparison("gt", "jg"),
            BinOp::Ge => self.gen_comparison("gte", "jge"),
            BinOp::BitAnd => self.ins("and ax, bx ; bitwise AND"),
            BinOp::BitOr => self.ins("or ax, bx ; bitwise OR"),
            BinOp::BitXor => self.ins("xor ax, bx ; bitwise XOR"),
            BinOp::Shl => {
                self.ins("mov cx, bx ; shift count in cx");
                self.ins("shl ax, cl ; shift left");
            }
            BinOp::Shr => {
                self.ins("mov cx, bx ; shift count in cx");
                self.ins("sar ax, cl ; shift right (arithmetic)");
            }
            BinOp::Comma | BinOp::LogicalAnd | BinOp::LogicalOr => {
                unreachable!()
            }
        }
        Ok(())
    }

    /// Compare `AX` with `BX` and materialize 0 or 1 without `setcc`.
    fn gen_comparison(&mut self, prefix: &str, jump: &str) {
        let id = self.next_label_id();
        self.ins(format!("cmp ax, bx ; {prefix} comparison"));
        self.ins("mov ax, 0 ; assume false");
        self.ins(format!("{jump} {prefix}_true_{id}"));
        self.ins(format!("jmp {prefix}_end_{id}"));
        self.label(format!("{prefix}_true_{id}"));
        self.ins("mov ax, 1 ; set true");
        self.label(format!("{prefix}_end_{id}"));
    }

    fn gen_unary(&mut self, op: &UnaryOp, operand: &Expr) -> Result<()> {
        match op {
            UnaryOp::Deref => {
                let pointer_ty = self.ty_of(operand);
                let byte = pointer_ty.deref().is_byte();
                let far = pointer_ty.far_pointer
                    || pointer_ty.base == crate::types::BaseKind::FarPointer;
                self.gen_expression(operand)?;
                self.ins("; dereferencing pointer");
                self.ins("mov bx, ax ; move address to bx");
                if far {
                    self.ins("push ds ; save data segment");
                    self.ins("mov ds, dx ; segment from dx");
                }
                if byte {
                    self.ins("mov al, [bx] ; load byte through pointer");
                    self.ins("mov ah, 0");
                } else {
                    self.ins("mov ax, [bx] ; dereference pointer");
                }
                if far {
                    self.ins("pop ds ; restore data segment");
                }
                Ok(())
            }
            UnaryOp::AddressOf => self.gen_address_of(operand),
            UnaryOp::Negate => {
                self.gen_expression(operand)?;
                self.ins("neg ax ; negate value");
                Ok(())
            }
            UnaryOp::Not => {
                self.gen_expression(operand)?;
                self.ins("test ax, ax ; test if ax is zero");
                self.ins("setz al ; 1 if zero");
                self.ins("movzx ax, al ; zero-extend al");
                Ok(())
            }
            UnaryOp::BitNot => {
                self.gen_expression(operand)?;
                self.ins("not ax ; bitwise NOT");
                Ok(())
            }
            UnaryOp::Cast(target) => {
                let from = self.ty_of(operand);
                self.gen_expression(operand)?;
                self.gen_conversion(&from, target);
                Ok(())
            }
            UnaryOp::PreInc => self.gen_incdec(operand, true, false),
            UnaryOp::PreDec => self.gen_incdec(operand, false, false),
            UnaryOp::PostInc => self.gen_incdec(operand, true, true),
            UnaryOp::PostDec => self.gen_incdec(operand, false, true),
        }
    }

    fn gen_conversion(&mut self, from: &TypeInfo, to: &TypeInfo) {
        use crate::types::BaseKind::*;
        if to.pointer > 0 || from.pointer > 0 {
            return;
        }
        if from.base == to.base {
            return;
        }
        match to.base {
            I8 | U8 | Bool => {
                self.ins("and ax, 0x00FF ; truncate to byte");
            }
            I16 if from.base == I8 => {
                self.ins("cbw ; sign extend byte to word");
            }
            U16 if matches!(from.base, I8 | U8 | Bool) => {
                self.ins("and ax, 0x00FF ; zero extend byte to word");
            }
            _ => {}
        }
    }

    /// Increment/decrement on anything addressable. Postfix keeps the
    /// pre-modification value in `AX`.
    fn gen_incdec(
        &mut self,
        operand: &Expr,
        increment: bool,
        postfix: bool,
    ) -> Result<()> {
        if !matches!(
            operand,
            Expr::Ident(_)
                | Expr::Member { .. }
                | Expr::Unary {
                    op: UnaryOp::Deref,
                    ..
                }
        ) {
            self.diags.report_error(
                None,
                "increment/decrement needs an addressable operand",
            )?;
            self.ins("; unsupported increment/decrement operand");
            return Ok(());
        }

        let ty = self.ty_of(operand);
        // pointers step by their element size
        let delta = if ty.is_pointer() { ty.stride() } else { 1 };
        let byte = ty.is_byte();
        let mnemonic = if increment { "add" } else { "sub" };

        self.gen_address_of(operand)?;
        self.ins("mov bx, ax ; operand address");
        if byte {
            self.ins("mov al, [bx]");
            self.ins("mov ah, 0");
        } else {
            self.ins("mov ax, [bx]");
        }
        if postfix {
            self.ins("push ax ; keep pre-modification value");
        }
        self.ins(format!("{mnemonic} ax, {delta}"));
        if byte {
            self.ins("mov [bx], al");
        } else {
            self.ins("mov [bx], ax");
        }
        if postfix {
            self.ins("pop ax ; expression value is the old one");
        }
        Ok(())
    }

    /// Leave the address of an lvalue in `AX`.
    pub(super) fn gen_address_of(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Ident(name) => {
                let name = name.clone();
                if self.frame.is_param(&name) {
                    let offset = -self.frame.offset(&name);
                    self.ins(format!(
                        "lea ax, [bp+{offset}] ; address of parameter {name}"
                    ));
                } else if self.frame.offset(&name) != 0 {
                    let offset = self.frame.offset(&name);
                    self.ins(format!(
                        "lea ax, [bp-{offset}] ; address of local variable {name}"
                    ));
                } else {
                    let ty =
                        self.symbols.lookup(&name).cloned().unwrap_or_default();
                    let label = if ty.array {
                        self.array_label_for(&name)
                    } else {
                        self.global_label(&name)
                    };
                    self.ins(format!(
                        "mov ax, {label} ; address of global {name}"
                    ));
                }
                Ok(())
            }
            Expr::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                // the pointer's value is the address
                self.gen_expression(operand)
            }
            Expr::Member {
                arrow,
                base,
                member,
            } => {
                if *arrow {
                    self.gen_expression(base)?;
                } else {
                    self.gen_address_of(base)?;
                }
                if let Some((offset, _)) = self.member_info(base, member) {
                    if offset > 0 {
                        self.ins(format!(
                            "add ax, {offset} ; offset of member {member}"
                        ));
                    }
                } else {
                    self.diags.report_error(
                        None,
                        format!("unknown struct member '{member}'"),
                    )?;
                }
                Ok(())
            }
            Expr::Binary { op, lhs, rhs }
                if matches!(op, BinOp::Add | BinOp::Sub)
                    && self.ty_of(lhs).is_pointer() =>
            {
                let element = {
                    let ty = self.ty_of(lhs);
                    ty.deref().element_size(self.structs).max(1)
                };
                self.gen_expression(lhs)?;
                self.ins("push ax ; save base address");
                self.gen_expression(rhs)?;
                match element {
                    1 => {}
                    2 => self.ins("shl ax, 1 ; scale index by 2"),
                    4 => self.ins("shl ax, 2 ; scale index by 4"),
                    n => {
                        self.ins(format!("mov cx, {n} ; element size"));
                        self.ins("mul cx ; scale index by element size");
                    }
                }
                self.ins("pop bx ; restore base address");
                if *op == BinOp::Add {
                    self.ins("add ax, bx ; element address");
                } else {
                    self.ins("sub bx, ax ; element address");
                    self.ins("mov ax, bx");
                }
                Ok(())
            }
            Expr::Literal(Literal::Str(raw)) => {
                let raw = raw.clone();
                let index = self.intern_string(&raw);
                self.ins(format!(
                    "mov ax, string_{index} ; address of string"
                ));
                Ok(())
            }
            _ => {
                self.diags.report_error(
                    None,
                    "cannot take the address of this expression",
                )?;
                self.ins("; unsupported address-of operand");
                Ok(())
            }
        }
    }

    /// Member metadata: (byte offset, member type). Follows one pointer
    /// level for `->`.
    fn member_info(
        &self,
        base: &Expr,
        member: &str,
    ) -> Option<(u32, TypeInfo)> {
        let base_ty = self.ty_of(base);
        let info = self.structs.lookup(base_ty.struct_name.as_deref()?)?;
        let found = info.member(member)?;
        Some((found.offset, found.ty.clone()))
    }

    /// Direct `[bp-N]` slot for `local.member` when the base struct lives in
    /// the current frame.
    fn local_member_slot(
        &self,
        arrow: bool,
        base: &Expr,
        member: &str,
    ) -> Option<(i32, TypeInfo)> {
        if arrow {
            return None;
        }
        let Expr::Ident(name) = base else { return None };
        let base_offset = self.frame.offset(name);
        if base_offset <= 0 {
            return None;
        }
        let (member_offset, ty) = self.member_info(base, member)?;
        Some((base_offset - member_offset as i32, ty))
    }

    fn gen_member_load(
        &mut self,
        arrow: bool,
        base: &Expr,
        member: &str,
    ) -> Result<()> {
        if let Some((slot, ty)) = self.local_member_slot(arrow, base, member) {
            if ty.is_byte() {
                self.ins(format!("mov al, [bp-{slot}] ; load member {member}"));
                self.ins("mov ah, 0");
            } else {
                self.ins(format!("mov ax, [bp-{slot}] ; load member {member}"));
            }
            return Ok(());
        }

        let member_ty = self
            .member_info(base, member)
            .map(|(_, ty)| ty)
            .unwrap_or_default();
        let expr = Expr::Member {
            arrow,
            base: Box::new(base.clone()),
            member: member.to_string(),
        };
        self.gen_address_of(&expr)?;
        self.ins("mov bx, ax ; member address");
        if member_ty.is_byte() {
            self.ins(format!("mov al, [bx] ; load member {member}"));
            self.ins("mov ah, 0");
        } else {
            self.ins(format!("mov ax, [bx] ; load member {member}"));
        }
        Ok(())
    }

    fn gen_call(&mut self, name: &str, args: &[Expr]) -> Result<()> {
        self.ins(format!("; function call to {name}"));
        // push arguments right-to-left
        for (index, arg) in args.iter().enumerate().rev() {
            self.gen_expression(arg)?;
            self.ins(format!("push ax ; argument {}", index + 1));
        }
        self.ins(format!("call _{name}"));
        if !args.is_empty() {
            self.ins(format!(
                "add sp, {} ; remove arguments",
                args.len() * 2
            ));
        }
        Ok(())
    }

    fn apply_compound(&mut self, op: AssignOp) {
        match op {
            AssignOp::Add => self.ins("add ax, bx ; +="),
            AssignOp::Sub => self.ins("sub ax, bx ; -="),
            AssignOp::Mul => self.ins("imul bx ; *="),
            AssignOp::Div => {
                self.ins("cwd ; sign extend for division");
                self.ins("idiv bx ; /=");
            }
            AssignOp::Mod => {
                self.ins("cwd ; sign extend for division");
                self.ins("idiv bx");
                self.ins("mov ax, dx ; remainder");
            }
            AssignOp::Shl => {
                self.ins("mov cx, bx ; shift count");
                self.ins("shl ax, cl ; <<=");
            }
            AssignOp::Shr => {
                self.ins("mov cx, bx ; shift count");
                self.ins("sar ax, cl ; >>=");
            }
            AssignOp::Plain => unreachable!(),
        }
    }

    /// Assignments leave the stored value in `AX`.
    fn gen_assignment(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
    ) -> Result<()> {
        self.ins("; assignment");
        match target {
            Expr::Ident(name) => {
                let name = name.clone();
                if op != AssignOp::Plain {
                    self.gen_ident_load(&name);
                    self.ins("push ax ; save old value");
                    self.gen_expression(value)?;
                    self.ins("push ax ; save right-hand side");
                    self.ins("pop bx ; right-hand side");
                    self.ins("pop ax ; old value");
                    self.apply_compound(op);
                } else {
                    self.gen_expression(value)?;
                }
                self.gen_ident_store(&name);
                Ok(())
            }

            Expr::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let pointer_ty = self.ty_of(operand);
                let byte = pointer_ty.deref().is_byte();
                let far = pointer_ty.far_pointer
                    || pointer_ty.base == crate::types::BaseKind::FarPointer;

                if op != AssignOp::Plain {
                    // load old value through the pointer
                    self.gen_expression(operand)?;
                    self.ins("mov bx, ax ; pointer to bx");
                    if byte {
                        self.ins("mov al, [bx]");
                        self.ins("mov ah, 0");
                    } else {
                        self.ins("mov ax, [bx]");
                    }
                    self.ins("push ax ; save old value");
                    self.gen_expression(value)?;
                    self.ins("push ax ; save right-hand side");
                    self.ins("pop bx ; right-hand side");
                    self.ins("pop ax ; old value");
                    self.apply_compound(op);
                    self.ins("push ax ; save result");
                    self.gen_expression(operand)?;
                    self.ins("mov bx, ax ; pointer to bx");
                    self.ins("pop ax ; result");
                } else {
                    self.gen_expression(value)?;
                    self.ins("push ax ; save right-hand side value");
                    self.gen_expression(operand)?;
                    self.ins("mov bx, ax ; move pointer address to bx");
                    self.ins("pop ax ; restore right-hand side value");
                }

                if far {
                    self.ins("; far pointer assignment");
                    self.ins("push ds ; save current ds");
                    self.ins("mov ds, dx ; segment from dx");
                }
                if byte {
                    self.ins("mov [bx], al ; store byte through pointer");
                } else {
                    self.ins("mov [bx], ax ; store word through pointer");
                }
                if far {
                    self.ins("pop ds ; restore ds");
                }
                Ok(())
            }

            Expr::Member {
                arrow,
                base,
                member,
            } => {
                if let Some((slot, ty)) =
                    self.local_member_slot(*arrow, base, member)
                {
                    if op != AssignOp::Plain {
                        if ty.is_byte() {
                            self.ins(format!("mov al, [bp-{slot}]"));
                            self.ins("mov ah, 0");
                        } else {
                            self.ins(format!("mov ax, [bp-{slot}]"));
                        }
                        self.ins("push ax ; save old value");
                        self.gen_expression(value)?;
                        self.ins("push ax ; save right-hand side");
                        self.ins("pop bx ; right-hand side");
                        self.ins("pop ax ; old value");
                        self.apply_compound(op);
                    } else {
                        self.gen_expression(value)?;
                    }
                    if ty.is_byte() {
                        self.ins(format!(
                            "mov [bp-{slot}], al ; store in member {member}"
                        ));
                    } else {
                        self.ins(format!(
                            "mov [bp-{slot}], ax ; store in member {member}"
                        ));
                    }
                    return Ok(());
                }

                let member_ty = self
                    .member_info(base, member)
                    .map(|(_, ty)| ty)
                    .unwrap_or_default();
                if op != AssignOp::Plain {
                    self.gen_address_of(target)?;
                    self.ins("mov bx, ax ; member address");
                    if member_ty.is_byte() {
                        self.ins("mov al, [bx]");
                        self.ins("mov ah, 0");
                    } else {
                        self.ins("mov ax, [bx]");
                    }
                    self.ins("push ax ; save old value");
                    self.gen_expression(value)?;
                    self.ins("push ax ; save right-hand side");
                    self.ins("pop bx ; right-hand side");
                    self.ins("pop ax ; old value");
                    self.apply_compound(op);
                    self.ins("push ax ; save result");
                    self.gen_address_of(target)?;
                    self.ins("mov bx, ax ; member address");
                    self.ins("pop ax ; result");
                } else {
                    self.gen_expression(value)?;
                    self.ins("push ax ; save right-hand side value");
                    self.gen_address_of(target)?;
                    self.ins("mov bx, ax ; member address");
                    self.ins("pop ax ; restore right-hand side value");
                }
                if member_ty.is_byte() {
                    self.ins(format!("mov [bx], al ; store in member {member}"));
                } else {
                    self.ins(format!("mov [bx], ax ; store in member {member}"));
                }
                Ok(())
            }

            _ => {
                self.diags
                    .warning(None, "unsupported assignment target");
                self.ins("; unsupported assignment target");
                Ok(())
            }
        }
    }
}
