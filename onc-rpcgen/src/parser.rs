//! RPCL parser.
//!
//! Every token parser skips the whitespace and comments in front of it.
//! `%` pass-through lines are treated as comments.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while},
    character::complete::{char, digit1, hex_digit1, multispace1, not_line_ending, satisfy},
    combinator::{all_consuming, cut, map, map_res, not, opt, recognize, value, verify},
    multi::{many0, many1, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    Finish, IResult,
};

use crate::{
    ast::{
        ConstDef, DeclType, Declaration, Definition, EnumDef, ProcedureDef, ProgramDef,
        Specification, StructDef, TypeSpec, UnionArm, UnionDef, Value, VersionDef,
    },
    Error,
};

const KEYWORDS: &[&str] = &[
    "bool", "case", "const", "default", "double", "enum", "float", "hyper", "int", "opaque",
    "program", "quadruple", "string", "struct", "switch", "typedef", "union", "unsigned",
    "version", "void",
];

/// Parses a whole `.x` file.
pub fn parse(source: &str) -> Result<Specification, Error> {
    match all_consuming(specification)(source).finish() {
        Ok((_, spec)) => Ok(spec),
        Err(err) => {
            let rest = skip_blank(err.input);
            let offset = source.len() - rest.len();
            let consumed = &source[..offset];
            let line = consumed.matches('\n').count() + 1;
            let column = offset - consumed.rfind('\n').map_or(0, |i| i + 1) + 1;
            Err(Error::Syntax {
                line,
                column,
                near: rest.chars().take(24).collect(),
            })
        }
    }
}

fn skip_blank(input: &str) -> &str {
    match blank(input) {
        Ok((rest, ())) => rest,
        Err(_) => input,
    }
}

fn specification(input: &str) -> IResult<&str, Specification> {
    map(terminated(many0(definition), blank), |definitions| {
        Specification { definitions }
    })(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(tag("/*"), take_until("*/"), tag("*/")),
        preceded(tag("//"), not_line_ending),
        preceded(char('%'), not_line_ending),
    ))(input)
}

fn blank(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, comment))))(input)
}

fn token<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    preceded(blank, inner)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    token(terminated(tag(word), not(satisfy(is_ident_char))))
}

fn symbol<'a>(c: char) -> impl FnMut(&'a str) -> IResult<&'a str, char> {
    token(char(c))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    token(verify(
        recognize(pair(
            satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
            take_while(is_ident_char),
        )),
        |ident: &str| !KEYWORDS.contains(&ident),
    ))(input)
}

fn number(input: &str) -> IResult<&str, i64> {
    token(alt((
        map_res(
            preceded(alt((tag("0x"), tag("0X"))), hex_digit1),
            |digits: &str| i64::from_str_radix(digits, 16),
        ),
        map_res(recognize(pair(opt(char('-')), digit1)), |digits: &str| {
            digits.parse::<i64>()
        }),
    )))(input)
}

fn constant_value(input: &str) -> IResult<&str, Value> {
    alt((
        map(number, Value::Number),
        map(identifier, |name| Value::Constant(name.to_string())),
    ))(input)
}

fn type_spec(input: &str) -> IResult<&str, TypeSpec> {
    alt((
        map(
            preceded(keyword("unsigned"), opt(alt((keyword("int"), keyword("hyper"))))),
            |ty| match ty {
                Some("hyper") => TypeSpec::UnsignedHyper,
                _ => TypeSpec::UnsignedInt,
            },
        ),
        value(TypeSpec::Int, keyword("int")),
        value(TypeSpec::Hyper, keyword("hyper")),
        value(TypeSpec::Float, keyword("float")),
        value(TypeSpec::Double, keyword("double")),
        value(TypeSpec::Bool, keyword("bool")),
        map(identifier, |name| TypeSpec::Named(name.to_string())),
    ))(input)
}

fn fixed_bound(input: &str) -> IResult<&str, Value> {
    delimited(symbol('['), constant_value, symbol(']'))(input)
}

fn variable_bound(input: &str) -> IResult<&str, Option<Value>> {
    delimited(symbol('<'), opt(constant_value), symbol('>'))(input)
}

fn declaration(input: &str) -> IResult<&str, Declaration> {
    enum Bound {
        Fixed(Value),
        Variable(Option<Value>),
    }

    alt((
        map(
            preceded(
                keyword("opaque"),
                pair(
                    identifier,
                    alt((
                        map(fixed_bound, DeclType::FixedOpaque),
                        map(variable_bound, DeclType::VarOpaque),
                    )),
                ),
            ),
            |(name, ty)| Declaration::new(name, ty),
        ),
        map(
            preceded(keyword("string"), pair(identifier, variable_bound)),
            |(name, max)| Declaration::new(name, DeclType::String(max)),
        ),
        map(tuple((type_spec, symbol('*'), identifier)), |(ty, _, name)| {
            Declaration::new(name, DeclType::Optional(ty))
        }),
        map(
            tuple((
                type_spec,
                identifier,
                opt(alt((
                    map(fixed_bound, Bound::Fixed),
                    map(variable_bound, Bound::Variable),
                ))),
            )),
            |(ty, name, bound)| {
                let ty = match bound {
                    None => DeclType::Plain(ty),
                    Some(Bound::Fixed(len)) => DeclType::FixedArray(ty, len),
                    Some(Bound::Variable(max)) => DeclType::VarArray(ty, max),
                };
                Declaration::new(name, ty)
            },
        ),
    ))(input)
}

fn void_or_declaration(input: &str) -> IResult<&str, Option<Declaration>> {
    alt((value(None, keyword("void")), map(declaration, Some)))(input)
}

fn definition(input: &str) -> IResult<&str, Definition> {
    alt((const_def, typedef, enum_def, struct_def, union_def, program_def))(input)
}

fn const_def(input: &str) -> IResult<&str, Definition> {
    map(
        preceded(
            keyword("const"),
            cut(terminated(
                separated_pair(identifier, symbol('='), constant_value),
                symbol(';'),
            )),
        ),
        |(name, value)| {
            Definition::Const(ConstDef {
                name: name.to_string(),
                value,
            })
        },
    )(input)
}

fn typedef(input: &str) -> IResult<&str, Definition> {
    map(
        preceded(keyword("typedef"), cut(terminated(declaration, symbol(';')))),
        Definition::Typedef,
    )(input)
}

fn enum_def(input: &str) -> IResult<&str, Definition> {
    map(
        preceded(
            keyword("enum"),
            cut(terminated(
                pair(
                    identifier,
                    delimited(
                        symbol('{'),
                        separated_list1(
                            symbol(','),
                            separated_pair(identifier, symbol('='), constant_value),
                        ),
                        symbol('}'),
                    ),
                ),
                symbol(';'),
            )),
        ),
        |(name, members)| {
            Definition::Enum(EnumDef {
                name: name.to_string(),
                members: members
                    .into_iter()
                    .map(|(member, value)| (member.to_string(), value))
                    .collect(),
            })
        },
    )(input)
}

fn struct_def(input: &str) -> IResult<&str, Definition> {
    map(
        preceded(
            keyword("struct"),
            cut(terminated(
                pair(
                    identifier,
                    delimited(
                        symbol('{'),
                        many1(terminated(declaration, symbol(';'))),
                        symbol('}'),
                    ),
                ),
                symbol(';'),
            )),
        ),
        |(name, fields)| {
            Definition::Struct(StructDef {
                name: name.to_string(),
                fields,
            })
        },
    )(input)
}

fn union_arm(input: &str) -> IResult<&str, UnionArm> {
    map(
        pair(
            many1(delimited(keyword("case"), constant_value, symbol(':'))),
            terminated(void_or_declaration, symbol(';')),
        ),
        |(cases, body)| UnionArm { cases, body },
    )(input)
}

fn union_def(input: &str) -> IResult<&str, Definition> {
    map(
        preceded(
            keyword("union"),
            cut(terminated(
                tuple((
                    identifier,
                    preceded(
                        keyword("switch"),
                        delimited(symbol('('), declaration, symbol(')')),
                    ),
                    delimited(
                        symbol('{'),
                        pair(
                            many1(union_arm),
                            opt(preceded(
                                pair(keyword("default"), symbol(':')),
                                terminated(void_or_declaration, symbol(';')),
                            )),
                        ),
                        symbol('}'),
                    ),
                )),
                symbol(';'),
            )),
        ),
        |(name, discriminant, (arms, default))| {
            Definition::Union(UnionDef {
                name: name.to_string(),
                discriminant,
                arms,
                default,
            })
        },
    )(input)
}

fn procedure(input: &str) -> IResult<&str, ProcedureDef> {
    map(
        terminated(
            tuple((
                alt((value(None, keyword("void")), map(type_spec, Some))),
                identifier,
                delimited(
                    symbol('('),
                    alt((
                        value(Vec::new(), keyword("void")),
                        separated_list1(symbol(','), type_spec),
                    )),
                    symbol(')'),
                ),
                preceded(symbol('='), constant_value),
            )),
            symbol(';'),
        ),
        |(result, name, args, number)| ProcedureDef {
            name: name.to_string(),
            number,
            result,
            args,
        },
    )(input)
}

fn version(input: &str) -> IResult<&str, VersionDef> {
    map(
        preceded(
            keyword("version"),
            cut(terminated(
                tuple((
                    identifier,
                    delimited(symbol('{'), many1(procedure), symbol('}')),
                    preceded(symbol('='), constant_value),
                )),
                symbol(';'),
            )),
        ),
        |(name, procedures, number)| VersionDef {
            name: name.to_string(),
            number,
            procedures,
        },
    )(input)
}

fn program_def(input: &str) -> IResult<&str, Definition> {
    map(
        preceded(
            keyword("program"),
            cut(terminated(
                tuple((
                    identifier,
                    delimited(symbol('{'), many1(version), symbol('}')),
                    preceded(symbol('='), constant_value),
                )),
                symbol(';'),
            )),
        ),
        |(name, versions, number)| {
            Definition::Program(ProgramDef {
                name: name.to_string(),
                number,
                versions,
            })
        },
    )(input)
}
