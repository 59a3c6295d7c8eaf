use std::collections::{HashMap, HashSet};

use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::{format_ident, quote, ToTokens};

use crate::{
    ast::{
        ConstDef, DeclType, Declaration, Definition, EnumDef, ProcedureDef, ProgramDef,
        Specification, StructDef, TypeSpec, UnionDef, Value, VersionDef,
    },
    Error,
};

/// serde implements its traits for arrays up to this length.
const MAX_ARRAY_LEN: usize = 32;

/// Bounds recursion through typedefs and nested structs.
const MAX_DEPTH: usize = 32;

const RUST_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "if", "impl", "in", "let",
    "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref", "return",
    "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized", "use",
    "virtual", "where", "while", "yield",
];

pub fn generate(spec: &Specification) -> Result<TokenStream, Error> {
    let symbols = Symbols::new(spec)?;
    let mut procedures = HashMap::new();
    let mut items = TokenStream::new();
    for definition in &spec.definitions {
        items.extend(match definition {
            Definition::Const(def) => symbols.constant(def)?,
            Definition::Typedef(decl) => symbols.typedef(decl)?,
            Definition::Enum(def) => symbols.enumeration(def)?,
            Definition::Struct(def) => symbols.structure(def)?,
            Definition::Union(def) => symbols.union(def)?,
            Definition::Program(def) => symbols.program(def, &mut procedures)?,
        });
    }
    Ok(items)
}

/// Names visible to the whole file.
struct Symbols<'a> {
    constants: HashMap<&'a str, &'a Value>,
    // enum members double as constants
    members: HashMap<&'a str, &'a Value>,
    types: HashMap<&'a str, &'a Definition>,
}

/// Type a union switches on.
enum Switch<'a> {
    Int,
    Unsigned,
    Enum(&'a EnumDef),
}

/// One resolved `case` label.
struct Case {
    /// Usable both as a pattern and as an expression.
    value: TokenStream,
    /// Variant name for a void arm.
    void_name: String,
}

impl<'a> Symbols<'a> {
    fn new(spec: &'a Specification) -> Result<Self, Error> {
        let mut symbols = Symbols {
            constants: HashMap::new(),
            members: HashMap::new(),
            types: HashMap::new(),
        };
        let mut names = HashSet::new();
        for definition in &spec.definitions {
            if !names.insert(definition.name()) {
                return Err(Error::Duplicate(definition.name().to_string()));
            }
            match definition {
                Definition::Const(def) => {
                    symbols.constants.insert(&def.name, &def.value);
                }
                Definition::Enum(def) => {
                    for (member, value) in &def.members {
                        if !names.insert(member) {
                            return Err(Error::Duplicate(member.clone()));
                        }
                        symbols.members.insert(member, value);
                    }
                    symbols.types.insert(&def.name, definition);
                }
                Definition::Typedef(_) | Definition::Struct(_) | Definition::Union(_) => {
                    symbols.types.insert(definition.name(), definition);
                }
                Definition::Program(_) => {}
            }
        }
        Ok(symbols)
    }

    fn resolve(&self, value: &Value) -> Result<i64, Error> {
        self.resolve_at(value, 0)
    }

    fn resolve_at(&self, value: &Value, depth: usize) -> Result<i64, Error> {
        match value {
            Value::Number(n) => Ok(*n),
            Value::Constant(name) => {
                let next = self
                    .constants
                    .get(name.as_str())
                    .or_else(|| self.members.get(name.as_str()))
                    .ok_or_else(|| Error::UnknownConstant(name.clone()))?;
                if depth > MAX_DEPTH {
                    return Err(Error::Unsupported(format!("constant {name:?} refers to itself")));
                }
                self.resolve_at(next, depth + 1)
            }
        }
    }

    fn resolve_i32(&self, name: &str, value: &Value) -> Result<i32, Error> {
        let value = self.resolve(value)?;
        i32::try_from(value).map_err(|_| out_of_range(name, value))
    }

    fn resolve_u32(&self, name: &str, value: &Value) -> Result<u32, Error> {
        let value = self.resolve(value)?;
        u32::try_from(value).map_err(|_| out_of_range(name, value))
    }

    fn length(&self, name: &str, value: &Value) -> Result<usize, Error> {
        let value = self.resolve(value)?;
        usize::try_from(value).map_err(|_| out_of_range(name, value))
    }

    fn lookup_type(&self, name: &str) -> Result<&'a Definition, Error> {
        self.types
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    fn spec_type(&self, spec: &TypeSpec) -> Result<TokenStream, Error> {
        Ok(match spec {
            TypeSpec::Int => quote!(i32),
            TypeSpec::UnsignedInt => quote!(u32),
            TypeSpec::Hyper => quote!(i64),
            TypeSpec::UnsignedHyper => quote!(u64),
            TypeSpec::Float => quote!(f32),
            TypeSpec::Double => quote!(f64),
            TypeSpec::Bool => quote!(bool),
            TypeSpec::Named(name) => {
                self.lookup_type(name)?;
                let ident = type_ident(name);
                quote!(#ident)
            }
        })
    }

    fn decl_type(&self, decl: &Declaration) -> Result<TokenStream, Error> {
        Ok(match &decl.ty {
            DeclType::Plain(spec) => self.spec_type(spec)?,
            DeclType::FixedArray(spec, len) => {
                let inner = self.spec_type(spec)?;
                let len = self.length(&decl.name, len)?;
                if len > MAX_ARRAY_LEN {
                    return Err(Error::Unsupported(format!(
                        "fixed array {:?} of {len} elements, at most {MAX_ARRAY_LEN} are supported",
                        decl.name
                    )));
                }
                let len = Literal::usize_unsuffixed(len);
                quote!([#inner; #len])
            }
            DeclType::VarArray(spec, _) => {
                let inner = self.spec_type(spec)?;
                quote!(::std::vec::Vec<#inner>)
            }
            DeclType::FixedOpaque(len) => {
                let len = Literal::usize_unsuffixed(self.length(&decl.name, len)?);
                quote!(::onc_rpc_core::xdr::FixedOpaque<#len>)
            }
            DeclType::VarOpaque(_) => quote!(::onc_rpc_core::xdr::Opaque),
            DeclType::String(_) => quote!(::std::string::String),
            DeclType::Optional(spec) => {
                let inner = self.spec_type(spec)?;
                quote!(::std::option::Option<::std::boxed::Box<#inner>>)
            }
        })
    }

    fn is_copy(&self, spec: &TypeSpec, depth: usize) -> bool {
        let TypeSpec::Named(name) = spec else {
            return true;
        };
        if depth > MAX_DEPTH {
            return false;
        }
        match self.types.get(name.as_str()) {
            Some(Definition::Enum(_)) => true,
            Some(Definition::Typedef(decl)) => self.is_copy_decl(&decl.ty, depth + 1),
            Some(Definition::Struct(def)) => def
                .fields
                .iter()
                .all(|field| self.is_copy_decl(&field.ty, depth + 1)),
            Some(Definition::Union(def)) => def
                .arms
                .iter()
                .map(|arm| arm.body.as_ref())
                .chain(def.default.iter().map(Option::as_ref))
                .flatten()
                .all(|body| self.is_copy_decl(&body.ty, depth + 1)),
            _ => false,
        }
    }

    fn is_copy_decl(&self, ty: &DeclType, depth: usize) -> bool {
        match ty {
            DeclType::Plain(spec) | DeclType::FixedArray(spec, _) => self.is_copy(spec, depth),
            DeclType::FixedOpaque(_) => true,
            _ => false,
        }
    }

    /// Primitives and enums are passed by value, everything else by reference.
    fn is_scalar(&self, spec: &TypeSpec) -> bool {
        let mut spec = spec;
        for _ in 0..MAX_DEPTH {
            let TypeSpec::Named(name) = spec else {
                return true;
            };
            match self.types.get(name.as_str()) {
                Some(Definition::Enum(_)) => return true,
                Some(Definition::Typedef(Declaration {
                    ty: DeclType::Plain(inner),
                    ..
                })) => spec = inner,
                _ => return false,
            }
        }
        false
    }

    fn constant(&self, def: &ConstDef) -> Result<TokenStream, Error> {
        let name = value_ident(&def.name);
        let value = self.resolve(&def.value)?;
        Ok(if let Ok(value) = i32::try_from(value) {
            let value = Literal::i32_unsuffixed(value);
            quote!(pub const #name: i32 = #value;)
        } else if let Ok(value) = u32::try_from(value) {
            let value = Literal::u32_unsuffixed(value);
            quote!(pub const #name: u32 = #value;)
        } else {
            let value = Literal::i64_unsuffixed(value);
            quote!(pub const #name: i64 = #value;)
        })
    }

    fn typedef(&self, decl: &Declaration) -> Result<TokenStream, Error> {
        let name = type_ident(&decl.name);
        let ty = self.decl_type(decl)?;
        Ok(quote!(pub type #name = #ty;))
    }

    fn enumeration(&self, def: &EnumDef) -> Result<TokenStream, Error> {
        let name = type_ident(&def.name);
        let mut variants = Vec::new();
        let mut values = Vec::new();
        let mut seen = HashSet::new();
        for (member, value) in &def.members {
            let value = self.resolve_i32(member, value)?;
            if !seen.insert(value) {
                return Err(Error::Duplicate(format!("{}::{member} = {value}", def.name)));
            }
            variants.push(type_ident(member));
            values.push(Literal::i32_unsuffixed(value));
        }
        let invalid = format!("invalid {} value {{}}", def.name);
        Ok(quote! {
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            #[repr(i32)]
            pub enum #name {
                #(#variants = #values,)*
            }

            impl #name {
                pub fn from_i32(value: i32) -> ::std::option::Option<Self> {
                    match value {
                        #(#values => ::std::option::Option::Some(Self::#variants),)*
                        _ => ::std::option::Option::None,
                    }
                }
            }

            impl ::serde::Serialize for #name {
                fn serialize<S: ::serde::Serializer>(
                    &self,
                    serializer: S,
                ) -> ::std::result::Result<S::Ok, S::Error> {
                    serializer.serialize_i32(*self as i32)
                }
            }

            impl<'de> ::serde::Deserialize<'de> for #name {
                fn deserialize<D: ::serde::Deserializer<'de>>(
                    deserializer: D,
                ) -> ::std::result::Result<Self, D::Error> {
                    let value = <i32 as ::serde::Deserialize>::deserialize(deserializer)?;
                    Self::from_i32(value).ok_or_else(|| {
                        <D::Error as ::serde::de::Error>::custom(format_args!(#invalid, value))
                    })
                }
            }
        })
    }

    fn structure(&self, def: &StructDef) -> Result<TokenStream, Error> {
        let name = type_ident(&def.name);
        let copy = self
            .is_copy(&TypeSpec::Named(def.name.clone()), 0)
            .then(|| quote!(, Copy));
        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        let mut types = Vec::new();
        for field in &def.fields {
            if !seen.insert(&field.name) {
                return Err(Error::Duplicate(format!("{}.{}", def.name, field.name)));
            }
            fields.push(field_ident(&field.name));
            types.push(self.decl_type(field)?);
        }
        Ok(quote! {
            #[derive(::serde::Serialize, ::serde::Deserialize, Debug, Clone, PartialEq #copy)]
            pub struct #name {
                #(pub #fields: #types,)*
            }
        })
    }

    fn switch(&self, decl: &Declaration) -> Result<Switch<'a>, Error> {
        let mut spec = match &decl.ty {
            DeclType::Plain(spec) => spec,
            _ => return Err(unsupported_switch(&decl.name)),
        };
        for _ in 0..MAX_DEPTH {
            match spec {
                TypeSpec::Int => return Ok(Switch::Int),
                TypeSpec::UnsignedInt => return Ok(Switch::Unsigned),
                TypeSpec::Named(name) => match self.lookup_type(name)? {
                    Definition::Enum(def) => return Ok(Switch::Enum(def)),
                    Definition::Typedef(Declaration {
                        ty: DeclType::Plain(inner),
                        ..
                    }) => spec = inner,
                    _ => break,
                },
                _ => break,
            }
        }
        Err(unsupported_switch(&decl.name))
    }

    fn case(&self, owner: &str, switch: &Switch<'_>, label: &Value) -> Result<Case, Error> {
        match switch {
            Switch::Int => {
                let n = self.resolve_i32(owner, label)?;
                let void_name = if n < 0 {
                    format!("CaseMinus{}", n.unsigned_abs())
                } else {
                    format!("Case{n}")
                };
                Ok(Case {
                    value: Literal::i32_unsuffixed(n).into_token_stream(),
                    void_name,
                })
            }
            Switch::Unsigned => {
                let n = self.resolve_u32(owner, label)?;
                Ok(Case {
                    value: Literal::u32_unsuffixed(n).into_token_stream(),
                    void_name: format!("Case{n}"),
                })
            }
            Switch::Enum(def) => {
                let n = self.resolve(label)?;
                let member = match label {
                    Value::Constant(name) if def.members.iter().any(|(m, _)| m == name) => {
                        Some(name.as_str())
                    }
                    _ => def
                        .members
                        .iter()
                        .find(|(_, value)| self.resolve(value).ok() == Some(n))
                        .map(|(member, _)| member.as_str()),
                };
                let member = member.ok_or_else(|| out_of_range(owner, n))?;
                let ty = type_ident(&def.name);
                let variant = type_ident(member);
                Ok(Case {
                    value: quote!(#ty::#variant),
                    void_name: camel(member),
                })
            }
        }
    }

    fn union(&self, def: &UnionDef) -> Result<TokenStream, Error> {
        let name = type_ident(&def.name);
        let switch = self.switch(&def.discriminant)?;
        let switch_ty = match &switch {
            Switch::Int => quote!(i32),
            Switch::Unsigned => quote!(u32),
            Switch::Enum(def) => type_ident(&def.name).into_token_stream(),
        };

        let mut variants = Vec::new();
        let mut discriminants = Vec::new();
        let mut encoders = Vec::new();
        let mut decoders = Vec::new();
        let mut case_values = Vec::new();
        let mut seen_values = HashSet::new();
        let mut seen_variants = HashSet::new();

        for arm in &def.arms {
            let [label] = arm.cases.as_slice() else {
                return Err(Error::Unsupported(format!(
                    "union {:?} has an arm with {} case labels, one per arm is supported",
                    def.name,
                    arm.cases.len()
                )));
            };
            let case = self.case(&def.name, &switch, label)?;
            if !seen_values.insert(case.value.to_string()) {
                return Err(Error::Duplicate(format!("{} case {}", def.name, case.value)));
            }
            let variant_name = match &arm.body {
                Some(body) => camel(&body.name),
                None => case.void_name.clone(),
            };
            if variant_name == "Other" || !seen_variants.insert(variant_name.clone()) {
                return Err(Error::Duplicate(format!("{}::{variant_name}", def.name)));
            }
            let variant = format_ident!("{}", variant_name);
            let value = &case.value;
            match &arm.body {
                Some(body) => {
                    let ty = self.decl_type(body)?;
                    variants.push(quote!(#variant(#ty)));
                    discriminants.push(quote!(Self::#variant(_) => #value,));
                    encoders.push(encode_arm(quote!(Self::#variant(value)), true));
                    decoders.push(quote! {
                        #value => ::std::result::Result::Ok(#name::#variant(
                            seq.next_element()?
                                .ok_or_else(|| ::serde::de::Error::invalid_length(1, &self))?,
                        )),
                    });
                }
                None => {
                    variants.push(quote!(#variant));
                    discriminants.push(quote!(Self::#variant => #value,));
                    encoders.push(encode_arm(quote!(Self::#variant), false));
                    decoders.push(quote!(#value => ::std::result::Result::Ok(#name::#variant),));
                }
            }
            case_values.push(case.value);
        }

        let other = format_ident!("{}Other", camel(&def.name));
        let mut other_type = TokenStream::new();
        match &def.default {
            Some(body) => {
                let doc = format!(
                    " A discriminant of [`{}`] that selects the `default` arm.",
                    camel(&def.name)
                );
                other_type = quote! {
                    #[doc = #doc]
                    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
                    pub struct #other(#switch_ty);

                    impl #other {
                        /// `None` for discriminants that select a `case` arm.
                        pub fn new(discriminant: #switch_ty) -> ::std::option::Option<Self> {
                            match discriminant {
                                #(#case_values)|* => ::std::option::Option::None,
                                other => ::std::option::Option::Some(Self(other)),
                            }
                        }

                        pub fn get(self) -> #switch_ty {
                            self.0
                        }
                    }
                };
                let claimed = quote! {
                    #other::new(other).ok_or_else(|| {
                        ::serde::de::Error::custom("discriminant belongs to a case arm")
                    })?
                };
                match body {
                    Some(body) => {
                        let ty = self.decl_type(body)?;
                        variants.push(quote!(Other(#other, #ty)));
                        discriminants.push(quote!(Self::Other(other, _) => other.get(),));
                        encoders.push(encode_arm(quote!(Self::Other(_, value)), true));
                        decoders.push(quote! {
                            other => {
                                let other = #claimed;
                                let value = seq
                                    .next_element()?
                                    .ok_or_else(|| ::serde::de::Error::invalid_length(1, &self))?;
                                ::std::result::Result::Ok(#name::Other(other, value))
                            }
                        });
                    }
                    None => {
                        variants.push(quote!(Other(#other)));
                        discriminants.push(quote!(Self::Other(other) => other.get(),));
                        encoders.push(encode_arm(quote!(Self::Other(_)), false));
                        decoders.push(quote! {
                            other => ::std::result::Result::Ok(#name::Other(#claimed)),
                        });
                    }
                }
            }
            None => {
                let unknown = format!("unknown {} discriminant {{:?}}", def.name);
                decoders.push(quote! {
                    other => ::std::result::Result::Err(
                        ::serde::de::Error::custom(format_args!(#unknown, other)),
                    ),
                });
            }
        }

        let copy = self
            .is_copy(&TypeSpec::Named(def.name.clone()), 0)
            .then(|| quote!(, Copy));
        let expecting = format!("union {}", def.name);
        Ok(quote! {
            #other_type

            #[derive(Debug, Clone, PartialEq #copy)]
            pub enum #name {
                #(#variants,)*
            }

            impl #name {
                pub fn discriminant(&self) -> #switch_ty {
                    match self {
                        #(#discriminants)*
                    }
                }
            }

            impl ::serde::Serialize for #name {
                fn serialize<S: ::serde::Serializer>(
                    &self,
                    serializer: S,
                ) -> ::std::result::Result<S::Ok, S::Error> {
                    use ::serde::ser::SerializeTuple;
                    match self {
                        #(#encoders)*
                    }
                }
            }

            impl<'de> ::serde::Deserialize<'de> for #name {
                fn deserialize<D: ::serde::Deserializer<'de>>(
                    deserializer: D,
                ) -> ::std::result::Result<Self, D::Error> {
                    struct UnionVisitor;

                    impl<'de> ::serde::de::Visitor<'de> for UnionVisitor {
                        type Value = #name;

                        fn expecting(
                            &self,
                            f: &mut ::std::fmt::Formatter<'_>,
                        ) -> ::std::fmt::Result {
                            f.write_str(#expecting)
                        }

                        #[allow(unreachable_patterns)]
                        fn visit_seq<A: ::serde::de::SeqAccess<'de>>(
                            self,
                            mut seq: A,
                        ) -> ::std::result::Result<#name, A::Error> {
                            let discriminant: #switch_ty = seq
                                .next_element()?
                                .ok_or_else(|| ::serde::de::Error::invalid_length(0, &self))?;
                            match discriminant {
                                #(#decoders)*
                            }
                        }
                    }

                    // the discriminant decides whether a second member follows
                    deserializer.deserialize_tuple(2, UnionVisitor)
                }
            }
        })
    }

    /// Whether `result` names an int-switched union whose arms are all void
    /// or bytes, so its reply can be copied out without decoding.
    fn is_byte_union(&self, result: &Option<TypeSpec>) -> bool {
        let Some(TypeSpec::Named(name)) = result else {
            return false;
        };
        let Some(Definition::Union(def)) = self.types.get(name.as_str()) else {
            return false;
        };
        if !matches!(def.discriminant.ty, DeclType::Plain(TypeSpec::Int)) {
            return false;
        }
        let mut has_bytes = false;
        let bodies = def
            .arms
            .iter()
            .map(|arm| arm.body.as_ref())
            .chain(def.default.iter().map(Option::as_ref));
        for body in bodies {
            match body.map(|decl| &decl.ty) {
                None => {}
                Some(DeclType::VarOpaque(_) | DeclType::String(_)) => has_bytes = true,
                Some(_) => return false,
            }
        }
        has_bytes
    }

    fn program(
        &self,
        def: &ProgramDef,
        procedures: &mut HashMap<String, u32>,
    ) -> Result<TokenStream, Error> {
        let program = value_ident(&def.name);
        let number = Literal::u32_unsuffixed(self.resolve_u32(&def.name, &def.number)?);
        let mut items = quote!(pub const #program: u32 = #number;);
        for version in &def.versions {
            items.extend(self.version(def, version, procedures)?);
        }
        Ok(items)
    }

    fn version(
        &self,
        program_def: &ProgramDef,
        def: &VersionDef,
        procedures: &mut HashMap<String, u32>,
    ) -> Result<TokenStream, Error> {
        let program = value_ident(&program_def.name);
        let version = value_ident(&def.name);
        let number = Literal::u32_unsuffixed(self.resolve_u32(&def.name, &def.number)?);
        let client = format_ident!("{}Client", camel(&def.name));
        let service = format_ident!("{}Service", camel(&def.name));
        let dispatch = format_ident!("dispatch_{}", snake(&def.name));

        let mut constants = Vec::new();
        let mut methods = Vec::new();
        let mut signatures = Vec::new();
        let mut arms = Vec::new();
        let mut seen = HashSet::new();

        for procedure in &def.procedures {
            let proc_number = self.resolve_u32(&procedure.name, &procedure.number)?;
            if !seen.insert(proc_number) {
                return Err(Error::Duplicate(format!(
                    "{} procedure {proc_number}",
                    def.name
                )));
            }
            match procedures.get(&procedure.name) {
                Some(&known) if known == proc_number => {}
                Some(_) => return Err(Error::Duplicate(procedure.name.clone())),
                None => {
                    procedures.insert(procedure.name.clone(), proc_number);
                    let name = value_ident(&procedure.name);
                    let proc_number = Literal::u32_unsuffixed(proc_number);
                    constants.push(quote!(pub const #name: u32 = #proc_number;));
                }
            }
            let (method, signature, arm) = self.procedure(procedure)?;
            methods.push(method);
            signatures.push(signature);
            arms.push(arm);
        }

        let client_doc = format!(
            " Client for version `{}` of program `{}`.",
            def.name, program_def.name
        );
        let service_doc = format!(" Server side of version `{}`.", def.name);
        let dispatch_doc = format!(
            " Decodes `args`, runs `procedure` of version `{}` on `service` and encodes the result.",
            def.name
        );
        Ok(quote! {
            pub const #version: u32 = #number;
            #(#constants)*

            #[doc = #client_doc]
            pub struct #client<T: ::onc_rpc_core::Transport = ::onc_rpc_core::TcpTransport> {
                stub: ::onc_rpc_core::ClientStub<T>,
            }

            impl #client<::onc_rpc_core::TcpTransport> {
                pub fn connect(
                    addr: ::std::net::SocketAddr,
                    config: ::onc_rpc_core::TransportConfig,
                ) -> ::std::result::Result<Self, ::onc_rpc_core::Error> {
                    ::onc_rpc_core::ClientStub::connect(addr, #program, #version, config)
                        .map(Self::from_stub)
                }

                /// Finds the server through rpcbind on `host`.
                pub fn connect_via_rpcbind(
                    host: ::std::net::IpAddr,
                    config: ::onc_rpc_core::TransportConfig,
                ) -> ::std::result::Result<Self, ::onc_rpc_core::Error> {
                    ::onc_rpc_core::ClientStub::connect_via_rpcbind(host, #program, #version, config)
                        .map(Self::from_stub)
                }

                /// Finds the server through the rpcbind service at `rpcbind_addr`.
                pub fn connect_with_rpcbind(
                    rpcbind_addr: ::std::net::SocketAddr,
                    config: ::onc_rpc_core::TransportConfig,
                ) -> ::std::result::Result<Self, ::onc_rpc_core::Error> {
                    ::onc_rpc_core::ClientStub::connect_with_rpcbind(
                        rpcbind_addr,
                        #program,
                        #version,
                        config,
                    )
                    .map(Self::from_stub)
                }
            }

            impl<T: ::onc_rpc_core::Transport> #client<T> {
                pub fn new(transport: T) -> Self {
                    Self::from_stub(::onc_rpc_core::ClientStub::new(transport, #program, #version))
                }

                pub fn from_stub(stub: ::onc_rpc_core::ClientStub<T>) -> Self {
                    Self { stub }
                }

                pub fn ping(&mut self) -> ::std::result::Result<(), ::onc_rpc_core::Error> {
                    self.stub.ping()
                }

                #(#methods)*

                /// Releases the connection. A client dropped without this call
                /// is released on drop.
                pub fn deinitialize(self) -> ::std::result::Result<(), ::onc_rpc_core::Error> {
                    self.stub.deinitialize()
                }
            }

            #[doc = #service_doc]
            pub trait #service: Send + Sync {
                #(#signatures)*
            }

            #[doc = #dispatch_doc]
            pub fn #dispatch<S: #service + ?Sized>(
                service: &S,
                procedure: u32,
                args: &[u8],
                results: &mut ::bytes::BytesMut,
            ) -> ::std::result::Result<(), ::onc_rpc_core::DispatchError> {
                match procedure {
                    #(#arms)*
                    _ => ::std::result::Result::Err(
                        ::onc_rpc_core::DispatchError::ProcUnavail(procedure),
                    ),
                }
            }
        })
    }

    /// Client method(s), service trait method and dispatch arm of one
    /// procedure.
    fn procedure(
        &self,
        def: &ProcedureDef,
    ) -> Result<(TokenStream, TokenStream, TokenStream), Error> {
        let constant = value_ident(&def.name);
        let method = field_ident(&snake(&def.name));
        let result = match &def.result {
            Some(spec) => self.spec_type(spec)?,
            None => quote!(()),
        };

        let names: Vec<Ident> = match def.args.len() {
            1 => vec![format_ident!("arg")],
            n => (1..=n).map(|i| format_ident!("arg{}", i)).collect(),
        };
        let mut owned = Vec::new();
        let mut params = Vec::new();
        for spec in &def.args {
            let ty = self.spec_type(spec)?;
            params.push(if self.is_scalar(spec) {
                ty.clone()
            } else {
                quote!(&#ty)
            });
            owned.push(ty);
        }
        let sent = match names.as_slice() {
            [] => quote!(&()),
            [arg] => quote!(&#arg),
            _ => quote!(&(#(#names),*)),
        };

        let mut client = quote! {
            pub fn #method(
                &mut self,
                #(#names: #params),*
            ) -> ::std::result::Result<#result, ::onc_rpc_core::Error> {
                self.stub.sync_call(#constant, #sent)
            }
        };
        if self.is_byte_union(&def.result) {
            let raw = format_ident!("{}_raw", snake(&def.name));
            let doc = format!(
                " Like [`Self::{method}`], but copies the arm's bytes into `buf` instead of decoding the union."
            );
            client.extend(quote! {
                #[doc = #doc]
                pub fn #raw(
                    &mut self,
                    #(#names: #params,)*
                    buf: &mut [u8],
                ) -> ::std::result::Result<::onc_rpc_core::RawUnion, ::onc_rpc_core::Error> {
                    self.stub.sync_call_raw_union(#constant, #sent, buf)
                }
            });
        }

        let signature = quote! {
            fn #method(&self, #(#names: #owned),*) -> #result;
        };

        let closure = match names.as_slice() {
            [] => quote!(|(): ()| service.#method()),
            [arg] => {
                let ty = &owned[0];
                quote!(|#arg: #ty| service.#method(#arg))
            }
            _ => quote!(|(#(#names),*): (#(#owned),*)| service.#method(#(#names),*)),
        };
        let arm = quote! {
            #constant => ::onc_rpc_core::call_procedure(args, results, #closure),
        };
        Ok((client, signature, arm))
    }
}

fn encode_arm(pattern: TokenStream, has_value: bool) -> TokenStream {
    let (len, value) = if has_value {
        (2usize, quote!(tuple.serialize_element(value)?;))
    } else {
        (1, TokenStream::new())
    };
    quote! {
        #pattern => {
            let mut tuple = serializer.serialize_tuple(#len)?;
            tuple.serialize_element(&self.discriminant())?;
            #value
            tuple.end()
        }
    }
}

fn out_of_range(name: &str, value: i64) -> Error {
    Error::OutOfRange {
        name: name.to_string(),
        value,
    }
}

fn unsupported_switch(name: &str) -> Error {
    Error::Unsupported(format!(
        "discriminant {name:?} must be int, unsigned int or an enum"
    ))
}

/// `TEST_VERS` becomes `TestVers`, `int_res` becomes `IntRes`.
fn camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for word in name.split('_').filter(|word| !word.is_empty()) {
        let shouting = !word.chars().any(|c| c.is_ascii_lowercase());
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            if shouting {
                out.extend(chars.map(|c| c.to_ascii_lowercase()));
            } else {
                out.extend(chars);
            }
        }
    }
    out
}

/// `STRUCT_MUL_FIELDS` becomes `struct_mul_fields`, `MyStruct` becomes
/// `my_struct`.
fn snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut after_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if after_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            after_lower = false;
        } else {
            out.push(c);
            after_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

fn ident(name: &str) -> Ident {
    match name {
        "self" | "Self" | "super" | "crate" => format_ident!("{}_", name),
        _ if RUST_KEYWORDS.contains(&name) => Ident::new_raw(name, Span::call_site()),
        _ => format_ident!("{}", name),
    }
}

fn type_ident(name: &str) -> Ident {
    ident(&camel(name))
}

fn field_ident(name: &str) -> Ident {
    ident(&snake(name))
}

/// Constants keep the spelling of the source.
fn value_ident(name: &str) -> Ident {
    ident(name)
}
