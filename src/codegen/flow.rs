//! Control-flow emission: `if`, `while`, `do`/`while` and `for`.
//!
//! Loops keep a stack of (continue, break) labels for the enclosing loop;
//! the language does not surface `break`/`continue` keywords yet.

use anyhow::Result;

use super::{CodeGen, LoopLabels};
use crate::ast::Stmt;

impl CodeGen<'_> {
    pub(super) fn gen_control_flow(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let else_label = self.make_label("if_else");
                let end_label = self.make_label("if_end");

                self.ins("; if statement");
                self.gen_expression(cond)?;
                self.ins("test ax, ax");
                if else_body.is_some() {
                    self.ins(format!("jz {else_label}"));
                } else {
                    self.ins(format!("jz {end_label}"));
                }

                self.ins("; if true branch");
                self.gen_statement(then_body)?;

                if let Some(else_body) = else_body {
                    self.ins(format!("jmp {end_label}"));
                    self.label(&else_label);
                    self.ins("; else branch");
                    self.gen_statement(else_body)?;
                }
                self.label(&end_label);
                Ok(())
            }

            Stmt::While { cond, body } => {
                let cond_label = self.make_label("while_cond");
                let body_label = self.make_label("while_body");
                let end_label = self.make_label("while_end");

                self.ins("; while loop");
                self.label(&cond_label);
                self.loop_stack.push(LoopLabels {
                    continue_label: cond_label.clone(),
                    break_label: end_label.clone(),
                });

                self.gen_expression(cond)?;
                self.ins("test ax, ax");
                self.ins(format!("jz {end_label}"));

                self.label(&body_label);
                self.gen_statement(body)?;
                self.ins(format!("jmp {cond_label}"));
                self.label(&end_label);

                self.loop_stack.pop();
                Ok(())
            }

            Stmt::DoWhile { body, cond } => {
                let body_label = self.make_label("do_body");
                let cond_label = self.make_label("do_cond");
                let end_label = self.make_label("do_end");

                self.ins("; do-while loop");
                self.label(&body_label);
                self.loop_stack.push(LoopLabels {
                    continue_label: cond_label.clone(),
                    break_label: end_label.clone(),
                });

                self.gen_statement(body)?;

                self.label(&cond_label);
                self.gen_expression(cond)?;
                self.ins("test ax, ax");
                self.ins(format!("jnz {body_label}"));
                self.label(&end_label);

                self.loop_stack.pop();
                Ok(())
            }

            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                let start_label = self.make_label("for_start");
                let cond_label = self.make_label("for_cond");
                let update_label = self.make_label("for_update");
                let end_label = self.make_label("for_end");

                self.ins("; for loop");
                if let Some(init) = init {
                    self.ins("; for loop initialization");
                    self.gen_statement(init)?;
                }

                self.ins(format!("jmp {cond_label}"));
                self.label(&start_label);

                self.loop_stack.push(LoopLabels {
                    continue_label: update_label.clone(),
                    break_label: end_label.clone(),
                });
                self.gen_statement(body)?;
                self.loop_stack.pop();

                self.label(&update_label);
                if let Some(update) = update {
                    self.ins("; for loop update");
                    self.gen_statement(update)?;
                }

                self.label(&cond_label);
                if let Some(cond) = cond {
                    self.ins("; for loop condition");
                    self.gen_expression(cond)?;
                    self.ins("test ax, ax");
                    self.ins(format!("jnz {start_label}"));
                } else {
                    self.ins(format!("jmp {start_label} ; unconditional loop"));
                }
                self.label(&end_label);
                Ok(())
            }

            _ => unreachable!("gen_control_flow called on a non-flow statement"),
        }
    }
}
