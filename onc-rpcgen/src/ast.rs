//! Syntax tree of an RPCL (`.x`) file, as laid out in RFC 4506 section 6
//! and RFC 5531 section 12.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specification {
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    Const(ConstDef),
    Typedef(Declaration),
    Enum(EnumDef),
    Struct(StructDef),
    Union(UnionDef),
    Program(ProgramDef),
}

impl Definition {
    /// Name the definition introduces.
    pub fn name(&self) -> &str {
        match self {
            Definition::Const(def) => &def.name,
            Definition::Typedef(decl) => &decl.name,
            Definition::Enum(def) => &def.name,
            Definition::Struct(def) => &def.name,
            Definition::Union(def) => &def.name,
            Definition::Program(def) => &def.name,
        }
    }
}

/// A number, or the name of a constant or enum member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Number(i64),
    Constant(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpec {
    Int,
    UnsignedInt,
    Hyper,
    UnsignedHyper,
    Float,
    Double,
    Bool,
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub ty: DeclType,
}

impl Declaration {
    pub fn new(name: &str, ty: DeclType) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

/// Shape of a declaration. Bounds of variable-length forms are optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclType {
    Plain(TypeSpec),
    FixedArray(TypeSpec, Value),
    VarArray(TypeSpec, Option<Value>),
    FixedOpaque(Value),
    VarOpaque(Option<Value>),
    String(Option<Value>),
    Optional(TypeSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstDef {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionDef {
    pub name: String,
    pub discriminant: Declaration,
    pub arms: Vec<UnionArm>,
    /// `default:` arm; `Some(None)` when it is void.
    pub default: Option<Option<Declaration>>,
}

/// One or more `case` labels sharing a body; `None` is a void body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionArm {
    pub cases: Vec<Value>,
    pub body: Option<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDef {
    pub name: String,
    pub number: Value,
    pub versions: Vec<VersionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDef {
    pub name: String,
    pub number: Value,
    pub procedures: Vec<ProcedureDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureDef {
    pub name: String,
    pub number: Value,
    /// `None` for `void`.
    pub result: Option<TypeSpec>,
    /// Empty for `void`.
    pub args: Vec<TypeSpec>,
}
