use anyhow::{anyhow, Result};
use bitflags::bitflags;
use indexmap::IndexMap;

use crate::ast::{Expr, Literal, UnaryOp};

/// Upper bound on struct definitions in one translation unit.
pub const MAX_STRUCT_DEFS: usize = 100;

/// Base kind of a value, before pointer/array decoration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    Bool,
    Void,
    /// A `segment:offset` pair, `DX:AX` at runtime.
    FarPointer,
    Struct,
}

impl BaseKind {
    pub fn name(&self) -> &'static str {
        match self {
            BaseKind::I8 => "char",
            BaseKind::U8 => "unsigned char",
            BaseKind::I16 => "int",
            BaseKind::U16 => "unsigned int",
            BaseKind::I32 => "long",
            BaseKind::U32 => "unsigned long",
            BaseKind::Bool => "bool",
            BaseKind::Void => "void",
            BaseKind::FarPointer => "far pointer",
            BaseKind::Struct => "struct",
        }
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, BaseKind::U8 | BaseKind::U16 | BaseKind::U32)
    }
}

bitflags! {
    /// Storage-class and call-convention markers carried on a type.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StorageFlags: u8 {
        const STATIC = 1 << 0;
        const STACKFRAME = 1 << 1;
        const FAR = 1 << 2;
    }
}

/// Full description of a declared or inferred type.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeInfo {
    pub base: BaseKind,
    /// Pointer depth: 0 = value, 1 = `T*`, 2 = `T**`, ...
    pub pointer: u8,
    pub far_pointer: bool,
    pub array: bool,
    pub array_size: u32,
    pub storage: StorageFlags,
    /// Set when `base` is `Struct`; the registry owns the descriptor.
    pub struct_name: Option<String>,
}

impl Default for TypeInfo {
    fn default() -> Self {
        TypeInfo {
            base: BaseKind::I16,
            pointer: 0,
            far_pointer: false,
            array: false,
            array_size: 0,
            storage: StorageFlags::empty(),
            struct_name: None,
        }
    }
}

impl TypeInfo {
    pub fn of(base: BaseKind) -> Self {
        TypeInfo {
            base,
            ..Default::default()
        }
    }

    pub fn pointer_to(base: BaseKind) -> Self {
        TypeInfo {
            base,
            pointer: 1,
            ..Default::default()
        }
    }

    /// True for anything `+`/`-` treats as an address: declared pointers,
    /// far-pointer literals, and arrays (which decay on use).
    pub fn is_pointer(&self) -> bool {
        self.pointer > 0 || self.base == BaseKind::FarPointer || self.array
    }

    pub fn is_void_pointer(&self) -> bool {
        self.base == BaseKind::Void && self.pointer > 0
    }

    /// True when a value of this type occupies a single byte in memory.
    pub fn is_byte(&self) -> bool {
        self.pointer == 0
            && matches!(self.base, BaseKind::I8 | BaseKind::U8 | BaseKind::Bool)
    }

    /// Size in bytes of one element of this type (§3 layout rules).
    pub fn element_size(&self, structs: &StructRegistry) -> u32 {
        if self.pointer > 0 {
            return if self.far_pointer { 4 } else { 2 };
        }
        match self.base {
            BaseKind::I8 | BaseKind::U8 | BaseKind::Bool => 1,
            BaseKind::I32 | BaseKind::U32 | BaseKind::FarPointer => 4,
            BaseKind::Void => 0,
            BaseKind::Struct => self
                .struct_name
                .as_deref()
                .and_then(|name| structs.lookup(name))
                .map(|info| info.size)
                .unwrap_or(0),
            _ => 2,
        }
    }

    /// Total size, arrays included.
    pub fn size(&self, structs: &StructRegistry) -> u32 {
        let element = self.element_size(structs);
        if self.array {
            element * self.array_size
        } else {
            element
        }
    }

    /// The type obtained by dereferencing this one.
    pub fn deref(&self) -> TypeInfo {
        let mut inner = self.clone();
        if inner.pointer > 0 {
            inner.pointer -= 1;
        }
        inner.array = false;
        inner
    }

    /// Size of the element a `+`/`-` on this pointer steps over. Only byte
    /// pointees skip the word scaling.
    pub fn stride(&self) -> u32 {
        if self.pointer > 1 {
            return 2;
        }
        match self.base {
            BaseKind::I8 | BaseKind::U8 | BaseKind::Bool => 1,
            _ => 2,
        }
    }
}

/// One member of a struct, offset computed at definition time.
#[derive(Clone, Debug)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeInfo,
    pub offset: u32,
}

/// A laid-out struct definition.
#[derive(Clone, Debug)]
pub struct StructInfo {
    pub name: String,
    pub members: Vec<StructMember>,
    pub size: u32,
}

impl StructInfo {
    pub fn member(&self, name: &str) -> Option<&StructMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Registry of struct definitions, keyed by name. Outlives the AST, so type
/// descriptors refer into it by name only.
#[derive(Default)]
pub struct StructRegistry {
    defs: IndexMap<String, StructInfo>,
}

impl StructRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot for a struct being parsed so self-referential members
    /// can resolve the name. Duplicates are fatal.
    pub fn declare(&mut self, name: &str) -> Result<()> {
        if self.defs.contains_key(name) {
            return Err(anyhow!("duplicate definition of struct '{name}'"));
        }
        if self.defs.len() >= MAX_STRUCT_DEFS {
            return Err(anyhow!(
                "maximum number of struct definitions ({MAX_STRUCT_DEFS}) exceeded"
            ));
        }
        self.defs.insert(
            name.to_string(),
            StructInfo {
                name: name.to_string(),
                members: Vec::new(),
                size: 0,
            },
        );
        Ok(())
    }

    /// Pack the member list in declaration order with no padding and store
    /// the finished layout.
    pub fn finish(&mut self, name: &str, mut members: Vec<StructMember>) {
        let mut offset = 0;
        for member in &mut members {
            member.offset = offset;
            offset += member.ty.size(self);
        }
        if let Some(info) = self.defs.get_mut(name) {
            info.members = members;
            info.size = offset;
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&StructInfo> {
        self.defs.get(name)
    }
}

/// Flat identifier → type mapping. All names are unique at declaration time;
/// the generator tells locals apart by frame offset, so no scoping is kept.
#[derive(Default)]
pub struct SymbolTable {
    symbols: IndexMap<String, TypeInfo>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: &str, ty: TypeInfo) {
        self.symbols.insert(name.to_string(), ty);
    }

    pub fn lookup(&self, name: &str) -> Option<&TypeInfo> {
        self.symbols.get(name)
    }
}

/// Infer the type of an expression. The sole source of truth for deciding
/// whether `+`/`-` needs element-size scaling.
pub fn type_of(
    expr: &Expr,
    symbols: &SymbolTable,
    structs: &StructRegistry,
) -> TypeInfo {
    match expr {
        Expr::Ident(name) => symbols
            .lookup(name)
            .cloned()
            .unwrap_or_else(|| TypeInfo::of(BaseKind::I16)),
        Expr::Literal(lit) => match lit {
            Literal::Int(_) => TypeInfo::of(BaseKind::I16),
            Literal::Char(_) => TypeInfo::of(BaseKind::I8),
            Literal::Str(_) => TypeInfo::pointer_to(BaseKind::I8),
            Literal::Bool(_) => TypeInfo::of(BaseKind::Bool),
            Literal::FarPtr { .. } => {
                let mut ty = TypeInfo::of(BaseKind::FarPointer);
                ty.far_pointer = true;
                ty
            }
        },
        Expr::Unary { op, operand } => match op {
            UnaryOp::AddressOf => {
                let mut ty = type_of(operand, symbols, structs);
                ty.pointer += 1;
                ty.far_pointer = false;
                ty
            }
            UnaryOp::Deref => type_of(operand, symbols, structs).deref(),
            UnaryOp::Cast(target) => target.clone(),
            _ => type_of(operand, symbols, structs),
        },
        Expr::Binary { lhs, rhs, .. } => {
            let left = type_of(lhs, symbols, structs);
            if left.is_pointer() {
                return left;
            }
            let right = type_of(rhs, symbols, structs);
            if right.is_pointer() {
                return right;
            }
            left
        }
        Expr::Assign { target, .. } => type_of(target, symbols, structs),
        Expr::Ternary { then_expr, .. } => {
            type_of(then_expr, symbols, structs)
        }
        Expr::Member { base, member, .. } => {
            let base_ty = type_of(base, symbols, structs);
            base_ty
                .struct_name
                .as_deref()
                .and_then(|name| structs.lookup(name))
                .and_then(|info| info.member(member))
                .map(|m| m.ty.clone())
                .unwrap_or_else(|| TypeInfo::of(BaseKind::I16))
        }
        Expr::Call { .. } => TypeInfo::of(BaseKind::I16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, ty: TypeInfo) -> StructMember {
        StructMember {
            name: name.to_string(),
            ty,
            offset: 0,
        }
    }

    #[test]
    fn struct_layout_packs_in_declaration_order() {
        let mut registry = StructRegistry::new();
        registry.declare("Mixed").unwrap();
        registry.finish(
            "Mixed",
            vec![
                member("flag", TypeInfo::of(BaseKind::U8)),
                member("count", TypeInfo::of(BaseKind::I16)),
                member("big", TypeInfo::of(BaseKind::I32)),
                member("next", TypeInfo::pointer_to(BaseKind::I16)),
            ],
        );
        let info = registry.lookup("Mixed").unwrap();
        let offsets: Vec<u32> = info.members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 1, 3, 7]);
        assert_eq!(info.size, 9);
    }

    #[test]
    fn struct_layout_multiplies_array_members() {
        let mut registry = StructRegistry::new();
        registry.declare("Buf").unwrap();
        let mut bytes = TypeInfo::of(BaseKind::U8);
        bytes.array = true;
        bytes.array_size = 8;
        let mut words = TypeInfo::of(BaseKind::I16);
        words.array = true;
        words.array_size = 4;
        registry.finish("Buf", vec![member("b", bytes), member("w", words)]);
        let info = registry.lookup("Buf").unwrap();
        assert_eq!(info.members[1].offset, 8);
        assert_eq!(info.size, 16);
    }

    #[test]
    fn nested_struct_members_use_resolved_size() {
        let mut registry = StructRegistry::new();
        registry.declare("Inner").unwrap();
        registry.finish(
            "Inner",
            vec![
                member("x", TypeInfo::of(BaseKind::I16)),
                member("y", TypeInfo::of(BaseKind::I16)),
            ],
        );
        registry.declare("Outer").unwrap();
        let mut inner_ty = TypeInfo::of(BaseKind::Struct);
        inner_ty.struct_name = Some("Inner".to_string());
        registry.finish(
            "Outer",
            vec![
                member("p", inner_ty),
                member("tag", TypeInfo::of(BaseKind::U8)),
            ],
        );
        let info = registry.lookup("Outer").unwrap();
        assert_eq!(info.members[1].offset, 4);
        assert_eq!(info.size, 5);
    }

    #[test]
    fn duplicate_struct_names_are_rejected() {
        let mut registry = StructRegistry::new();
        registry.declare("S").unwrap();
        assert!(registry.declare("S").is_err());
    }

    #[test]
    fn far_pointers_are_four_bytes() {
        let registry = StructRegistry::new();
        let mut ty = TypeInfo::pointer_to(BaseKind::I16);
        ty.far_pointer = true;
        assert_eq!(ty.size(&registry), 4);
        assert_eq!(TypeInfo::pointer_to(BaseKind::I8).size(&registry), 2);
    }

    #[test]
    fn oracle_follows_pointers_and_members() {
        let registry = {
            let mut registry = StructRegistry::new();
            registry.declare("P").unwrap();
            registry.finish(
                "P",
                vec![
                    member("x", TypeInfo::of(BaseKind::I16)),
                    member("c", TypeInfo::of(BaseKind::I8)),
                ],
            );
            registry
        };
        let mut symbols = SymbolTable::new();
        symbols.define("p", TypeInfo::pointer_to(BaseKind::I16));
        let mut sp = TypeInfo::pointer_to(BaseKind::Struct);
        sp.struct_name = Some("P".to_string());
        symbols.define("sp", sp);

        let deref = Expr::Unary {
            op: UnaryOp::Deref,
            operand: Box::new(Expr::Ident("p".to_string())),
        };
        assert_eq!(type_of(&deref, &symbols, &registry).pointer, 0);

        let addr = Expr::Unary {
            op: UnaryOp::AddressOf,
            operand: Box::new(Expr::Ident("p".to_string())),
        };
        assert_eq!(type_of(&addr, &symbols, &registry).pointer, 2);

        let member_access = Expr::Member {
            arrow: true,
            base: Box::new(Expr::Ident("sp".to_string())),
            member: "c".to_string(),
        };
        let ty = type_of(&member_access, &symbols, &registry);
        assert_eq!(ty.base, BaseKind::I8);
        assert!(ty.is_byte());
    }

    #[test]
    fn string_literals_are_char_pointers() {
        let registry = StructRegistry::new();
        let symbols = SymbolTable::new();
        let expr = Expr::Literal(Literal::Str("hi".to_string()));
        let ty = type_of(&expr, &symbols, &registry);
        assert!(ty.is_pointer());
        assert_eq!(ty.stride(), 1);
    }
}
