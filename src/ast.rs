use bitflags::bitflags;

use crate::types::TypeInfo;

/// Root of the translation unit.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

#[derive(Clone, Debug)]
pub enum Item {
    Function(Function),
    Global(Declaration),
    StructDef(StructDef),
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FnFlags: u8 {
        const STACKFRAME = 1 << 0;
        const FAR = 1 << 1;
        const NAKED = 1 << 2;
        const STATIC = 1 << 3;
        const DEPRECATED = 1 << 4;
        const VARIADIC = 1 << 5;
    }
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub return_type: TypeInfo,
    pub flags: FnFlags,
    pub deprecation_msg: Option<String>,
    pub params: Vec<Declaration>,
    pub body: Block,
}

#[derive(Clone, Debug, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug)]
pub struct Declaration {
    pub name: String,
    pub ty: TypeInfo,
    pub init: Option<Initializer>,
    /// Byte offset of the declaring identifier, for diagnostics.
    pub pos: usize,
}

#[derive(Clone, Debug)]
pub enum Initializer {
    Expr(Expr),
    /// Brace-enclosed list, one entry per element/member.
    List(Vec<Expr>),
}

#[derive(Clone, Debug)]
pub struct StructDef {
    pub name: String,
    pub members: Vec<Declaration>,
}

#[derive(Clone, Debug)]
pub enum Stmt {
    Block(Block),
    Decl(Declaration),
    Expr(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_body: Box<Stmt>,
        else_body: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    /// `__asm { ... }`: raw token text between the braces.
    AsmBlock(String),
    /// `__asm("template" [: : "r"(expr), ...])`
    Asm {
        template: String,
        operands: Vec<AsmOperand>,
    },
}

#[derive(Clone, Debug)]
pub struct AsmOperand {
    pub constraint: String,
    pub expr: Expr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Comma,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Plain,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UnaryOp {
    AddressOf,
    Deref,
    Negate,
    Not,
    BitNot,
    Cast(TypeInfo),
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i32),
    Char(u8),
    /// Raw text between the quotes; escapes resolve when interned.
    Str(String),
    Bool(bool),
    FarPtr {
        segment: u16,
        offset: u16,
    },
}

#[derive(Clone, Debug)]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Member {
        /// `->` when true, `.` otherwise.
        arrow: bool,
        base: Box<Expr>,
        member: String,
    },
}

/// Indented tree dump used by `-d`.
pub fn print_program(program: &Program) {
    for item in &program.items {
        match item {
            Item::Function(f) => {
                println!(
                    "FUNCTION (name: {}, flags: {:?})",
                    f.name, f.flags
                );
                for param in &f.params {
                    println!("  PARAM (name: {}, type: {})", param.name, param.ty.base.name());
                }
                print_block(&f.body, 1);
            }
            Item::Global(d) => {
                println!("DECLARATION (name: {}, type: {})", d.name, d.ty.base.name());
            }
            Item::StructDef(s) => {
                println!("STRUCT_DEF (name: {})", s.name);
                for member in &s.members {
                    println!("  MEMBER (name: {}, type: {})", member.name, member.ty.base.name());
                }
            }
        }
    }
}

fn print_block(block: &Block, indent: usize) {
    let pad = "  ".repeat(indent);
    println!("{pad}BLOCK");
    for stmt in &block.stmts {
        print_stmt(stmt, indent + 1);
    }
}

fn print_stmt(stmt: &Stmt, indent: usize) {
    let pad = "  ".repeat(indent);
    match stmt {
        Stmt::Block(b) => print_block(b, indent),
        Stmt::Decl(d) => {
            println!("{pad}DECLARATION (name: {}, type: {})", d.name, d.ty.base.name())
        }
        Stmt::Expr(e) => {
            println!("{pad}EXPRESSION");
            print_expr(e, indent + 1);
        }
        Stmt::Return(e) => {
            println!("{pad}RETURN");
            if let Some(e) = e {
                print_expr(e, indent + 1);
            }
        }
        Stmt::If { cond, then_body, else_body } => {
            println!("{pad}IF");
            print_expr(cond, indent + 1);
            print_stmt(then_body, indent + 1);
            if let Some(else_body) = else_body {
                println!("{pad}ELSE");
                print_stmt(else_body, indent + 1);
            }
        }
        Stmt::While { cond, body } => {
            println!("{pad}WHILE");
            print_expr(cond, indent + 1);
            print_stmt(body, indent + 1);
        }
        Stmt::DoWhile { body, cond } => {
            println!("{pad}DO_WHILE");
            print_stmt(body, indent + 1);
            print_expr(cond, indent + 1);
        }
        Stmt::For { init, cond, update, body } => {
            println!("{pad}FOR");
            if let Some(init) = init {
                print_stmt(init, indent + 1);
            }
            if let Some(cond) = cond {
                print_expr(cond, indent + 1);
            }
            if let Some(update) = update {
                print_stmt(update, indent + 1);
            }
            print_stmt(body, indent + 1);
        }
        Stmt::AsmBlock(_) => println!("{pad}ASM_BLOCK"),
        Stmt::Asm { .. } => println!("{pad}ASM"),
    }
}

fn print_expr(expr: &Expr, indent: usize) {
    let pad = "  ".repeat(indent);
    match expr {
        Expr::Literal(lit) => match lit {
            Literal::Int(v) => println!("{pad}LITERAL (value: {v})"),
            Literal::Char(c) => println!("{pad}LITERAL (char: {c})"),
            Literal::Str(s) => println!("{pad}LITERAL (string: \"{s}\")"),
            Literal::Bool(b) => println!("{pad}LITERAL (value: {b})"),
            Literal::FarPtr { segment, offset } => {
                println!("{pad}LITERAL (far ptr: {segment:04X}:{offset:04X})")
            }
        },
        Expr::Ident(name) => println!("{pad}IDENTIFIER (name: {name})"),
        Expr::Binary { op, lhs, rhs } => {
            println!("{pad}BINARY_OP (op: {op:?})");
            print_expr(lhs, indent + 1);
            print_expr(rhs, indent + 1);
        }
        Expr::Unary { op, operand } => {
            println!("{pad}UNARY_OP (op: {op:?})");
            print_expr(operand, indent + 1);
        }
        Expr::Assign { op, target, value } => {
            println!("{pad}ASSIGNMENT (op: {op:?})");
            print_expr(target, indent + 1);
            print_expr(value, indent + 1);
        }
        Expr::Ternary { cond, then_expr, else_expr } => {
            println!("{pad}TERNARY");
            print_expr(cond, indent + 1);
            print_expr(then_expr, indent + 1);
            print_expr(else_expr, indent + 1);
        }
        Expr::Call { name, args } => {
            println!("{pad}CALL (function: {name})");
            for arg in args {
                print_expr(arg, indent + 1);
            }
        }
        Expr::Member { arrow, base, member } => {
            println!(
                "{pad}MEMBER_ACCESS ({} {member})",
                if *arrow { "->" } else { "." }
            );
            print_expr(base, indent + 1);
        }
    }
}
