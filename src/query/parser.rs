use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, peek, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
};
use uuid::Uuid;
use crate::core::error::{Error, Result};
use crate::core::types::FieldValue;
use crate::index::CompareOp;
use crate::query::ast::Filter;

/// Parse a filter string. Blank input means "no filter".
///
/// Grammar, loosest binding first:
/// - `a or b`, `a || b`
/// - `a and b`, `a && b`
/// - `not a`, `!a`
/// - `(a)` or `column op literal` with op one of `= == != <> > >= < <=`
///
/// Literals are quoted strings (single or double), integers, decimals,
/// `true`/`false`, `null`, or bare GUIDs.
pub fn parse_filter(input: &str) -> Result<Option<Filter>> {
    if input.trim().is_empty() {
        return Ok(None);
    }

    match all_consuming(delimited(multispace0, or_expr, multispace0)).parse(input) {
        Ok((_, filter)) => Ok(Some(filter)),
        Err(e) => Err(Error::query_compile(format!("Invalid filter '{}': {}", input, e))),
    }
}

fn or_expr(input: &str) -> IResult<&str, Filter> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(or_keyword, and_expr)).parse(input)?;
    Ok((input, rest.into_iter().fold(first, Filter::or)))
}

fn and_expr(input: &str) -> IResult<&str, Filter> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(preceded(and_keyword, not_expr)).parse(input)?;
    Ok((input, rest.into_iter().fold(first, Filter::and)))
}

fn not_expr(input: &str) -> IResult<&str, Filter> {
    alt((
        map(preceded(not_keyword, not_expr), Filter::negate),
        primary,
    )).parse(input)
}

fn primary(input: &str) -> IResult<&str, Filter> {
    alt((
        delimited(
            pair(char('('), multispace0),
            or_expr,
            pair(multispace0, char(')')),
        ),
        comparison,
    )).parse(input)
}

fn comparison(input: &str) -> IResult<&str, Filter> {
    let (input, column) = identifier(input)?;
    let (input, op) = delimited(multispace0, compare_op, multispace0).parse(input)?;
    let (input, value) = literal(input)?;
    Ok((input, Filter::Compare { column: column.to_string(), op, value }))
}

fn or_keyword(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(multispace1, tag_no_case("or"), multispace1),
        delimited(multispace0, tag("||"), multispace0),
    )).parse(input)
}

fn and_keyword(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(multispace1, tag_no_case("and"), multispace1),
        delimited(multispace0, tag("&&"), multispace0),
    )).parse(input)
}

fn not_keyword(input: &str) -> IResult<&str, &str> {
    alt((
        terminated(tag_no_case("not"), alt((multispace1, peek(tag("("))))),
        terminated(tag("!"), pair(not(char('=')), multispace0)),
    )).parse(input)
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Equal, tag("==")),
        value(CompareOp::NotEqual, tag("!=")),
        value(CompareOp::NotEqual, tag("<>")),
        value(CompareOp::GreaterOrEqual, tag(">=")),
        value(CompareOp::LessOrEqual, tag("<=")),
        value(CompareOp::Greater, tag(">")),
        value(CompareOp::Less, tag("<")),
        value(CompareOp::Equal, tag("=")),
    )).parse(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    )).parse(input)
}

fn literal(input: &str) -> IResult<&str, FieldValue> {
    alt((
        quoted,
        guid,
        number,
        keyword_literal,
    )).parse(input)
}

fn quoted(input: &str) -> IResult<&str, FieldValue> {
    map(
        alt((
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        )),
        |s: &str| FieldValue::Text(s.to_string()),
    ).parse(input)
}

fn guid(input: &str) -> IResult<&str, FieldValue> {
    map_res(
        take_while1(|c: char| c.is_ascii_hexdigit() || c == '-'),
        |s: &str| Uuid::parse_str(s).map(FieldValue::Guid),
    ).parse(input)
}

fn number(input: &str) -> IResult<&str, FieldValue> {
    let (rest, text) = recognize((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )).parse(input)?;

    let parsed = if text.contains('.') {
        text.parse::<f64>().ok().map(FieldValue::Float)
    } else {
        text.parse::<i64>().ok().map(FieldValue::Integer)
    };

    match parsed {
        Some(v) => Ok((rest, v)),
        None => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))),
    }
}

fn keyword_literal(input: &str) -> IResult<&str, FieldValue> {
    terminated(
        alt((
            value(FieldValue::Boolean(true), tag_no_case("true")),
            value(FieldValue::Boolean(false), tag_no_case("false")),
            value(FieldValue::Null, tag_no_case("null")),
        )),
        not(satisfy(|c: char| c.is_alphanumeric() || c == '_')),
    ).parse(input)
}
