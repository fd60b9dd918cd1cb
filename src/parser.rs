use crate::ast::*;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt, recognize, value, verify},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("no monad block found")]
    MissingMonadBlock,
    #[error("unbalanced braces in monad block")]
    UnbalancedBraces,
    #[error("unrecognized rule snippet: `{0}`")]
    InvalidRuleSnippet(String),
    #[error("invalid expression `{text}`: {message}")]
    InvalidExpression { text: String, message: String },
    #[error("invalid action script `{text}`: {message}")]
    InvalidScript { text: String, message: String },
}

lazy_static! {
    static ref NAME_RE: Regex = Regex::new(r"monad\s+(\w+)").expect("valid regex");
    static ref STATE_RE: Regex = Regex::new(r"state:\s*'([^']+)'").expect("valid regex");
    static ref MEMORY_RE: Regex = Regex::new(r"memory:\s*\{([^}]*)\}").expect("valid regex");
    static ref FIELD_RULE_RE: Regex =
        Regex::new(r"on\s+field\s*\(([^)]+)\)\s*\{([\s\S]*?)\}").expect("valid regex");
    static ref TICK_RULE_RE: Regex =
        Regex::new(r"on\s+tick\s*\(([^)]*)\)\s*\{([\s\S]*?)\}").expect("valid regex");
    static ref META_RE: Regex =
        Regex::new(r"rule-modifier\s*\{([\s\S]*?)\}\s*$").expect("valid regex");
}

/// Entry point of the parser: one `monad <Name> { ... }` block to an
/// immutable definition.
///
/// Block isolation uses explicit brace-depth counting (rule actions may
/// contain conditional blocks, so the body is not a bounded pattern).
/// The sub-extractions below operate on the isolated body and never
/// overlap: the rule-modifier span is excised before rule extraction so
/// that `add_rule("on tick() { ... }")` snippets inside a meta-script are
/// not installed as static rules.
#[instrument(level = "debug", skip(source))]
pub fn parse_definition(source: &str) -> Result<MonadDefinition, ParseError> {
    let (name, body) = extract_monad_block(source)?;

    let mut meta_rules = Vec::new();
    let rule_region = if let Some(caps) = META_RE.captures(&body) {
        let script = caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        let start = caps.get(0).map(|m| m.start()).unwrap_or(body.len());
        meta_rules.push(script);
        body[..start].to_string()
    } else {
        body.clone()
    };

    let initial_state = STATE_RE
        .captures(&body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let initial_memory = match MEMORY_RE.captures(&body).and_then(|c| c.get(1)) {
        Some(m) => parse_memory_literal(m.as_str()),
        None => IndexMap::new(),
    };

    let mut rules = Vec::new();
    for caps in FIELD_RULE_RE.captures_iter(&rule_region) {
        if let (Some(condition), Some(action)) = (caps.get(1), caps.get(2)) {
            rules.push(build_field_rule(
                condition.as_str().trim(),
                action.as_str().trim(),
            ));
        }
    }
    for caps in TICK_RULE_RE.captures_iter(&rule_region) {
        if let (Some(trigger), Some(action)) = (caps.get(1), caps.get(2)) {
            rules.push(build_tick_rule(
                trigger.as_str().trim(),
                action.as_str().trim(),
            ));
        }
    }

    debug!(
        "parsed monad `{}`: {} rules, {} meta-rules",
        name,
        rules.len(),
        meta_rules.len()
    );

    Ok(MonadDefinition {
        name,
        initial_state,
        initial_memory,
        rules,
        meta_rules,
    })
}

/// Re-parses a single `on field(...) { ... }` or `on tick(...) { ... }`
/// snippet, as handed to the `add_rule` capability by a meta-script.
#[instrument(level = "debug", skip(source))]
pub fn parse_rule_snippet(source: &str) -> Result<Rule, ParseError> {
    if source.contains("on field") {
        if let Some(caps) = FIELD_RULE_RE.captures(source) {
            if let (Some(condition), Some(action)) = (caps.get(1), caps.get(2)) {
                return Ok(build_field_rule(
                    condition.as_str().trim(),
                    action.as_str().trim(),
                ));
            }
        }
    } else if source.contains("on tick") {
        if let Some(caps) = TICK_RULE_RE.captures(source) {
            if let (Some(trigger), Some(action)) = (caps.get(1), caps.get(2)) {
                return Ok(build_tick_rule(
                    trigger.as_str().trim(),
                    action.as_str().trim(),
                ));
            }
        }
    }
    Err(ParseError::InvalidRuleSnippet(source.to_string()))
}

/// Parses a condition/trigger expression. Empty text is the literal
/// `true`: a rule with no trigger fires every time.
pub fn parse_condition(text: &str) -> Result<Expression, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Expression::Literal(Literal::Boolean(true)));
    }
    match all_consuming(parse_expression)(trimmed) {
        Ok((_, expression)) => Ok(expression),
        Err(e) => Err(ParseError::InvalidExpression {
            text: trimmed.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Parses an action script (also used for meta-rule scripts, which share
/// the statement grammar).
pub fn parse_action(text: &str) -> Result<Vec<Statement>, ParseError> {
    match all_consuming(parse_statements)(text) {
        Ok((_, statements)) => Ok(statements),
        Err(e) => Err(ParseError::InvalidScript {
            text: text.to_string(),
            message: e.to_string(),
        }),
    }
}

fn build_field_rule(condition: &str, action: &str) -> Rule {
    Rule::Field {
        condition: condition.to_string(),
        action: action.to_string(),
        compiled: compile_rule(condition, action),
    }
}

fn build_tick_rule(trigger: &str, action: &str) -> Rule {
    Rule::Tick {
        trigger: trigger.to_string(),
        action: action.to_string(),
        compiled: compile_rule(trigger, action),
    }
}

fn compile_rule(condition: &str, action: &str) -> CompiledRule {
    CompiledRule {
        condition: parse_condition(condition),
        action: parse_action(action),
    }
}

fn extract_monad_block(source: &str) -> Result<(String, String), ParseError> {
    let start = source
        .find("monad ")
        .ok_or(ParseError::MissingMonadBlock)?;
    let brace_start = source[start..]
        .find('{')
        .map(|offset| start + offset)
        .ok_or(ParseError::MissingMonadBlock)?;
    let name = NAME_RE
        .captures(&source[start..brace_start])
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ParseError::MissingMonadBlock)?;

    // Depth starts at 1 on the opening brace; the scan ends exactly when
    // it returns to 0.
    let mut depth = 0usize;
    for (offset, c) in source[brace_start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let body = source[brace_start + 1..brace_start + offset].to_string();
                    return Ok((name, body));
                }
            }
            _ => {}
        }
    }
    Err(ParseError::UnbalancedBraces)
}

/// The `memory: { ... }` object literal: comma-separated `key: value`
/// pairs, values coerced to integer when lexically numeric, else kept as
/// text. Nested values are outside the supported grammar.
fn parse_memory_literal(text: &str) -> IndexMap<String, Literal> {
    let mut memory = IndexMap::new();
    for entry in text.split(',') {
        let Some((key, value)) = entry.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_matches(|c| c == '\'' || c == '"').to_string();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let literal = match value.parse::<i64>() {
            Ok(n) => Literal::Integer(n),
            Err(_) => {
                Literal::String(value.trim_matches(|c| c == '\'' || c == '"').to_string())
            }
        };
        memory.insert(key, literal);
    }
    memory
}

// Statements

fn parse_statements(input: &str) -> IResult<&str, Vec<Statement>> {
    terminated(many0(parse_statement), multispace0)(input)
}

fn parse_statement(input: &str) -> IResult<&str, Statement> {
    alt((parse_if_statement, parse_simple_statement))(input)
}

fn parse_simple_statement(input: &str) -> IResult<&str, Statement> {
    alt((parse_add_rule, parse_memory_assignment, parse_state_assignment))(input)
}

fn parse_state_assignment(input: &str) -> IResult<&str, Statement> {
    map(
        preceded(pair(ws(keyword("state")), ws(tag("=>"))), parse_expression),
        |value| Statement::StateAssign { value },
    )(input)
}

fn parse_memory_assignment(input: &str) -> IResult<&str, Statement> {
    map(
        tuple((
            ws(tag("memory")),
            char('.'),
            identifier,
            ws(tag("=>")),
            parse_expression,
        )),
        |(_, _, key, _, value)| Statement::MemoryAssign {
            key: key.to_string(),
            value,
        },
    )(input)
}

fn parse_if_statement(input: &str) -> IResult<&str, Statement> {
    map(
        tuple((
            ws(keyword("if")),
            delimited(ws(char('(')), parse_expression, ws(char(')'))),
            delimited(ws(char('{')), many0(parse_simple_statement), ws(char('}'))),
        )),
        |(_, condition, then_block)| Statement::If {
            condition,
            then_block,
        },
    )(input)
}

fn parse_add_rule(input: &str) -> IResult<&str, Statement> {
    map(
        preceded(
            ws(keyword("add_rule")),
            delimited(ws(char('(')), ws(parse_string), ws(char(')'))),
        ),
        |source| Statement::AddRule { source },
    )(input)
}

// Expressions, precedence low to high:
// or < and < not < in/not in < comparison < additive < multiplicative < unary

fn parse_expression(input: &str) -> IResult<&str, Expression> {
    parse_logical_or(input)
}

fn parse_logical_or(input: &str) -> IResult<&str, Expression> {
    let (input, first) = parse_logical_and(input)?;
    let (input, rest) = many0(preceded(ws(keyword("or")), parse_logical_and))(input)?;

    let result = rest
        .into_iter()
        .fold(first, |left, right| Expression::BinaryOp {
            op: BinaryOperator::Or,
            left: Box::new(left),
            right: Box::new(right),
        });

    Ok((input, result))
}

fn parse_logical_and(input: &str) -> IResult<&str, Expression> {
    let (input, first) = parse_negation(input)?;
    let (input, rest) = many0(preceded(ws(keyword("and")), parse_negation))(input)?;

    let result = rest
        .into_iter()
        .fold(first, |left, right| Expression::BinaryOp {
            op: BinaryOperator::And,
            left: Box::new(left),
            right: Box::new(right),
        });

    Ok((input, result))
}

fn parse_negation(input: &str) -> IResult<&str, Expression> {
    alt((
        map(preceded(ws(keyword("not")), parse_negation), |operand| {
            Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            }
        }),
        parse_membership,
    ))(input)
}

fn parse_membership(input: &str) -> IResult<&str, Expression> {
    let (input, first) = parse_comparison(input)?;
    let (input, rest) = opt(pair(
        ws(alt((
            value(
                BinaryOperator::NotIn,
                pair(keyword("not"), ws(keyword("in"))),
            ),
            value(BinaryOperator::In, keyword("in")),
        ))),
        parse_comparison,
    ))(input)?;

    match rest {
        Some((op, right)) => Ok((
            input,
            Expression::BinaryOp {
                op,
                left: Box::new(first),
                right: Box::new(right),
            },
        )),
        None => Ok((input, first)),
    }
}

fn parse_comparison(input: &str) -> IResult<&str, Expression> {
    let (input, first) = parse_additive(input)?;
    let (input, rest) = opt(tuple((
        ws(alt((
            tag("=="),
            tag("!="),
            tag("<="),
            tag(">="),
            tag("<"),
            tag(">"),
        ))),
        parse_additive,
    )))(input)?;

    match rest {
        Some((op, right)) => {
            let op = match op {
                "==" => BinaryOperator::Equal,
                "!=" => BinaryOperator::NotEqual,
                "<" => BinaryOperator::LessThan,
                ">" => BinaryOperator::GreaterThan,
                "<=" => BinaryOperator::LessThanEqual,
                ">=" => BinaryOperator::GreaterThanEqual,
                _ => unreachable!(),
            };
            Ok((
                input,
                Expression::BinaryOp {
                    op,
                    left: Box::new(first),
                    right: Box::new(right),
                },
            ))
        }
        None => Ok((input, first)),
    }
}

fn parse_additive(input: &str) -> IResult<&str, Expression> {
    let (input, first) = parse_multiplicative(input)?;
    let (input, rest) = many0(pair(ws(alt((tag("+"), tag("-")))), parse_multiplicative))(input)?;

    let result = rest
        .into_iter()
        .fold(first, |left, (op, right)| Expression::BinaryOp {
            op: match op {
                "+" => BinaryOperator::Add,
                "-" => BinaryOperator::Subtract,
                _ => unreachable!(),
            },
            left: Box::new(left),
            right: Box::new(right),
        });

    Ok((input, result))
}

fn parse_multiplicative(input: &str) -> IResult<&str, Expression> {
    let (input, first) = parse_unary(input)?;
    let (input, rest) = many0(pair(ws(alt((tag("*"), tag("/")))), parse_unary))(input)?;

    let result = rest
        .into_iter()
        .fold(first, |left, (op, right)| Expression::BinaryOp {
            op: match op {
                "*" => BinaryOperator::Multiply,
                "/" => BinaryOperator::Divide,
                _ => unreachable!(),
            },
            left: Box::new(left),
            right: Box::new(right),
        });

    Ok((input, result))
}

fn parse_unary(input: &str) -> IResult<&str, Expression> {
    alt((
        map(preceded(ws(char('-')), parse_unary), |operand| {
            Expression::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            }
        }),
        parse_primary,
    ))(input)
}

fn parse_primary(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        map(parse_literal, Expression::Literal),
        delimited(ws(char('(')), parse_expression, ws(char(')'))),
        parse_path,
    )))(input)
}

const RESERVED_WORDS: [&str; 8] = ["and", "or", "not", "in", "if", "true", "false", "null"];

fn parse_path(input: &str) -> IResult<&str, Expression> {
    map(
        verify(
            separated_list1(char('.'), identifier),
            |parts: &Vec<&str>| !RESERVED_WORDS.contains(&parts[0]),
        ),
        |parts| {
            if parts.len() == 1 {
                Expression::Variable(parts[0].to_string())
            } else {
                Expression::MemberAccess(AccessPath(
                    parts.into_iter().map(String::from).collect(),
                ))
            }
        },
    )(input)
}

fn parse_literal(input: &str) -> IResult<&str, Literal> {
    alt((
        map(parse_f64_strict, Literal::Float),
        map(parse_i64, Literal::Integer),
        map(parse_string, Literal::String),
        map(keyword("true"), |_| Literal::Boolean(true)),
        map(keyword("false"), |_| Literal::Boolean(false)),
        map(keyword("null"), |_| Literal::Null),
    ))(input)
}

fn parse_string(input: &str) -> IResult<&str, String> {
    alt((
        map(
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            |s: &str| s.to_string(),
        ),
        map(
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
            |s: &str| s.to_string(),
        ),
    ))(input)
}

fn parse_f64_strict(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((
            take_while1(|c: char| c.is_ascii_digit()),
            char('.'),
            take_while1(|c: char| c.is_ascii_digit()),
        ))),
        |s: &str| s.parse::<f64>(),
    )(input)
}

fn parse_i64(input: &str) -> IResult<&str, i64> {
    map_res(digit1, |s: &str| s.parse::<i64>())(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    let id_chars = |c: char| c.is_alphanumeric() || c == '_';
    let start_chars = |c: char| c.is_alphabetic() || c == '_';

    take_while1(start_chars)(input).and_then(|(rest, first)| {
        let (rest, others) = take_while(id_chars)(rest)?;
        Ok((rest, &input[..first.len() + others.len()]))
    })
}

/// Matches a bare word without consuming a longer identifier that merely
/// starts with it.
fn keyword(kw: &'static str) -> impl Fn(&str) -> IResult<&str, &str> {
    move |input: &str| {
        let (rest, matched) = tag(kw)(input)?;
        match rest.chars().next() {
            Some(c) if c.is_alphanumeric() || c == '_' => Err(nom::Err::Error(
                nom::error::Error::new(input, nom::error::ErrorKind::Tag),
            )),
            _ => Ok((rest, matched)),
        }
    }
}

/// Whitespace skip around an inner parser.
fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}
