use nom::{
    IResult, Parser,
    bytes::complete::{take_till, take_till1},
    character::complete::{char, digit0, digit1, multispace0, one_of},
    combinator::{opt, recognize},
    error::{ErrorKind, ParseError},
    sequence::pair,
};

use crate::ast::Value;
use crate::{Error, SyntaxErrorKind, catch_abnormal};

/// Characters that end a symbol
const SYMBOL_DELIMITERS: &[char] = &[' ', '\t', '\r', '\n', '(', ')', '[', ']', '{', '}', ','];

/// Characters that are a syntax error where a form is expected
const UNEXPECTED_CHARS: &[char] = &[')', '[', ']', '{', '}', ',', '.'];

/// Reader failure carrying the unconsumed input, so the absolute position can be
/// recovered once parsing is over.
#[derive(Debug)]
struct ReadFault<'a> {
    remaining: &'a str,
    kind: SyntaxErrorKind,
    message: String,
    found: Option<String>,
}

impl<'a> ParseError<&'a str> for ReadFault<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        ReadFault {
            remaining: input,
            kind: SyntaxErrorKind::UnexpectedCharacter,
            message: format!("unexpected input ({kind:?})"),
            found: input.chars().next().map(String::from),
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl ReadFault<'_> {
    fn into_error(self, text: &str) -> Error {
        let position = text.len().saturating_sub(self.remaining.len());
        Error::syntax(self.kind, self.message, position, self.found)
    }
}

type ReadResult<'a, T> = IResult<&'a str, T, ReadFault<'a>>;

/// Abort reading; there is never a second alternative to try.
fn fail<'a, T>(
    remaining: &'a str,
    kind: SyntaxErrorKind,
    message: impl Into<String>,
    found: Option<String>,
) -> ReadResult<'a, T> {
    Err(nom::Err::Failure(ReadFault {
        remaining,
        kind,
        message: message.into(),
        found,
    }))
}

fn whitespace(input: &str) -> ReadResult<'_, &str> {
    multispace0(input)
}

/// Read one form after skipping leading whitespace
fn read_form(input: &str) -> ReadResult<'_, Value> {
    let (input, _) = whitespace(input)?;
    let mut lookahead = input.chars();

    match (lookahead.next(), lookahead.next()) {
        (None, _) => fail(
            input,
            SyntaxErrorKind::UnexpectedEnd,
            "reached end of input parsing sexp",
            None,
        ),
        (Some('('), _) => read_list(input),
        (Some('"'), _) => read_string(input),
        (Some(c), _) if c.is_ascii_digit() => read_number(input),
        (Some('+' | '-'), Some(d)) if d.is_ascii_digit() => read_number(input),
        (Some(c), _) if UNEXPECTED_CHARS.contains(&c) => fail(
            input,
            SyntaxErrorKind::UnexpectedCharacter,
            format!("unexpected character '{c}'"),
            Some(c.to_string()),
        ),
        _ => read_symbol(input),
    }
}

fn read_list(input: &str) -> ReadResult<'_, Value> {
    let opened: ReadResult<'_, char> = char('(').parse(input);
    let (mut input, _) = opened?;
    let mut elements = Vec::new();

    loop {
        let (rest, _) = whitespace(input)?;
        if rest.is_empty() {
            return fail(
                rest,
                SyntaxErrorKind::UnexpectedEnd,
                "reached end of input parsing list",
                None,
            );
        }
        if let Some(rest) = rest.strip_prefix(')') {
            return Ok((rest, Value::List(elements)));
        }
        let (rest, element) = read_form(rest)?;
        elements.push(element);
        input = rest;
    }
}

/// Strings are scanned verbatim; backslashes have no meaning
fn read_string(input: &str) -> ReadResult<'_, Value> {
    let opened: ReadResult<'_, char> = char('"').parse(input);
    let (body, _) = opened?;
    let scanned: ReadResult<'_, &str> = take_till(|c: char| c == '"').parse(body);
    let (rest, text) = scanned?;

    match rest.strip_prefix('"') {
        Some(rest) => Ok((rest, Value::String(text.to_owned()))),
        None => fail(
            rest,
            SyntaxErrorKind::UnterminatedString,
            "string not terminated by double quote",
            None,
        ),
    }
}

fn number_literal(input: &str) -> ReadResult<'_, &str> {
    recognize((opt(one_of("+-")), digit1, opt(pair(char('.'), digit0)))).parse(input)
}

fn read_number(input: &str) -> ReadResult<'_, Value> {
    let (rest, literal) = number_literal(input)?;

    match rest.chars().next() {
        None | Some(' ' | '\t' | '\r' | '\n' | ')') => {}
        Some(c) => {
            return fail(
                rest,
                SyntaxErrorKind::MalformedNumber,
                format!("not a valid number: {literal}{c}"),
                Some(c.to_string()),
            );
        }
    }

    if literal.ends_with('.') {
        // Reported at the dot itself
        let at_dot = input.get(literal.len() - 1..).unwrap_or(rest);
        return fail(
            at_dot,
            SyntaxErrorKind::MalformedNumber,
            format!("not a valid number: {literal}"),
            Some(literal.to_owned()),
        );
    }

    match Value::number(literal) {
        Ok(number) => Ok((rest, number)),
        Err(e) => fail(
            input,
            SyntaxErrorKind::MalformedNumber,
            e.to_string(),
            Some(literal.to_owned()),
        ),
    }
}

fn read_symbol(input: &str) -> ReadResult<'_, Value> {
    let scanned: ReadResult<'_, &str> =
        take_till1(|c: char| SYMBOL_DELIMITERS.contains(&c)).parse(input);
    let (rest, name) = scanned?;
    Ok((rest, Value::Symbol(name.to_owned())))
}

/// Read one form from `text` starting at byte offset `start`.
///
/// Returns the form and the offset just past it. Leading whitespace is skipped;
/// anything after the form is left for the next call. Positions in syntax errors
/// are byte offsets into the whole of `text`.
pub fn read(text: &str, start: usize) -> Result<(Value, usize), Error> {
    catch_abnormal("read", || {
        let Some(input) = text.get(start..) else {
            return Err(Error::syntax(
                SyntaxErrorKind::InvalidStartIndex,
                format!("start index {start} is not a character boundary of the input"),
                start,
                None,
            ));
        };

        match read_form(input) {
            Ok((rest, value)) => Ok((value, text.len() - rest.len())),
            Err(nom::Err::Error(fault) | nom::Err::Failure(fault)) => {
                let err = fault.into_error(text);
                tracing::debug!(%err, "read failed");
                Err(err)
            }
            Err(nom::Err::Incomplete(_)) => Err(Error::syntax(
                SyntaxErrorKind::UnexpectedEnd,
                "incomplete input",
                text.len(),
                None,
            )),
        }
    })
}

/// Read `text` as exactly one form, allowing only whitespace after it.
pub fn read_fully(text: &str) -> Result<Value, Error> {
    let (value, next) = read(text, 0)?;
    let trailing = text.get(next..).unwrap_or_default();

    match trailing.char_indices().find(|&(_, c)| !matches!(c, ' ' | '\t' | '\r' | '\n')) {
        None => Ok(value),
        Some((offset, c)) => {
            let err = Error::syntax(
                SyntaxErrorKind::TrailingContent,
                "expected a single form but found more input",
                next + offset,
                Some(c.to_string()),
            );
            tracing::debug!(%err, "read_fully failed");
            Err(err)
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::SyntaxError;
    use crate::ast::{dec, sym, val};
    use pretty_assertions::assert_eq;

    /// Test result variants for comprehensive reader testing
    #[derive(Debug)]
    enum ReadTestResult {
        Success(Value),
        Fails(SyntaxErrorKind, usize),
    }
    use ReadTestResult::*;

    /// Micro-helper for success cases
    fn success<T: Into<Value>>(value: T) -> ReadTestResult {
        Success(value.into())
    }

    fn run_read_tests(test_cases: Vec<(&str, ReadTestResult)>) {
        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            let test_id = format!("#{} '{}'", i + 1, input);
            match (read_fully(input), expected) {
                (Ok(actual), Success(expected)) => {
                    assert_eq!(actual, expected, "{test_id}: wrong value");
                }
                (
                    Err(Error::SyntaxError(SyntaxError { kind, position, .. })),
                    Fails(expected_kind, expected_position),
                ) => {
                    assert_eq!(kind, expected_kind, "{test_id}: wrong error kind");
                    assert_eq!(position, expected_position, "{test_id}: wrong position");
                }
                (actual, expected) => {
                    panic!("{test_id}: expected {expected:?}, got {actual:?}");
                }
            }
        }
    }

    #[test]
    fn test_read_atoms() {
        run_read_tests(vec![
            // Numbers
            ("42", success(42)),
            ("0", success(0)),
            ("-17", success(-17)),
            ("+5", success(5)),
            ("1.25", Success(dec("1.25"))),
            ("-0.5", Success(dec("-0.5"))),
            ("007", success(7)),
            ("3.0", success(3)),
            // Strings are verbatim
            ("\"hello world\"", success("hello world")),
            ("\"\"", success("")),
            ("\"a\\nb\"", success("a\\nb")),
            ("\"(not a list)\"", success("(not a list)")),
            // Symbols, including sign characters not followed by a digit
            ("+", Success(sym("+"))),
            ("-", Success(sym("-"))),
            ("-a", Success(sym("-a"))),
            ("a", Success(sym("a"))),
            ("and", Success(sym("and"))),
            ("if", Success(sym("if"))),
            ("nil", Success(sym("nil"))),
            (":asdf", Success(sym(":asdf"))),
            ("let*", Success(sym("let*"))),
            ("not=", Success(sym("not="))),
            ("a.b", Success(sym("a.b"))),
            ("a\"b", Success(sym("a\"b"))),
            ("über", Success(sym("über"))),
            // Surrounding whitespace
            ("  42", success(42)),
            ("42 \t\r\n", success(42)),
        ]);
    }

    #[test]
    fn test_read_lists() {
        run_read_tests(vec![
            ("()", Success(Value::List(vec![]))),
            ("( )", Success(Value::List(vec![]))),
            ("(+ 1 2)", success([sym("+"), val(1), val(2)])),
            (
                "(a (b c) \"d\")",
                success([sym("a"), val([sym("b"), sym("c")]), val("d")]),
            ),
            (
                "(\n  let a 2\n  (+ 1 a))",
                success([
                    sym("let"),
                    sym("a"),
                    val(2),
                    val([sym("+"), val(1), sym("a")]),
                ]),
            ),
            ("(1)", success([1])),
            ("(1.5)", Success(val([dec("1.5")]))),
            ("(a)(b)", Fails(SyntaxErrorKind::TrailingContent, 3)),
            ("((()))", success([val([Value::List(vec![])])])),
        ]);
    }

    #[test]
    fn test_read_errors() {
        use SyntaxErrorKind::*;

        run_read_tests(vec![
            // Unexpected characters where a form is expected
            (")", Fails(UnexpectedCharacter, 0)),
            ("[1]", Fails(UnexpectedCharacter, 0)),
            ("{", Fails(UnexpectedCharacter, 0)),
            (",", Fails(UnexpectedCharacter, 0)),
            (".", Fails(UnexpectedCharacter, 0)),
            (".5", Fails(UnexpectedCharacter, 0)),
            ("(a ])", Fails(UnexpectedCharacter, 3)),
            // End of input
            ("", Fails(UnexpectedEnd, 0)),
            ("   ", Fails(UnexpectedEnd, 3)),
            ("(", Fails(UnexpectedEnd, 1)),
            ("(1 2", Fails(UnexpectedEnd, 4)),
            ("(1 (2 3)", Fails(UnexpectedEnd, 8)),
            // Strings
            ("\"abc", Fails(UnterminatedString, 4)),
            ("(\"abc)", Fails(UnterminatedString, 6)),
            // Malformed numbers report the offending character
            ("0.", Fails(MalformedNumber, 1)),
            ("1.", Fails(MalformedNumber, 1)),
            ("-1.", Fails(MalformedNumber, 2)),
            ("+2.", Fails(MalformedNumber, 2)),
            ("(1.)", Fails(MalformedNumber, 2)),
            ("1.2.3", Fails(MalformedNumber, 3)),
            ("12a", Fails(MalformedNumber, 2)),
            ("1e5", Fails(MalformedNumber, 1)),
            ("1.a", Fails(MalformedNumber, 2)),
            ("(1(2))", Fails(MalformedNumber, 2)),
            ("5]", Fails(MalformedNumber, 1)),
            // Trailing content
            ("1 2", Fails(TrailingContent, 2)),
            ("foo]", Fails(TrailingContent, 3)),
        ]);
    }

    #[test]
    fn test_read_error_details() {
        let err = read_fully("(a ]").unwrap_err();
        assert_eq!(
            err,
            Error::SyntaxError(SyntaxError::new(
                SyntaxErrorKind::UnexpectedCharacter,
                "unexpected character ']'",
                3,
                Some("]".into()),
            ))
        );

        let err = read_fully("(1 2").unwrap_err();
        assert_eq!(
            format!("{err}"),
            "SyntaxError: reached end of input parsing list at position 4"
        );

        let err = read_fully("").unwrap_err();
        assert_eq!(
            format!("{err}"),
            "SyntaxError: reached end of input parsing sexp at position 0"
        );
    }

    #[test]
    fn test_read_with_start_index() {
        let text = "(a) (b) 3";
        let (first, next) = read(text, 0).unwrap();
        assert_eq!(first, val([sym("a")]));
        assert_eq!(next, 3);

        let (second, next) = read(text, next).unwrap();
        assert_eq!(second, val([sym("b")]));
        assert_eq!(next, 7);

        let (third, next) = read(text, next).unwrap();
        assert_eq!(third, val(3));
        assert_eq!(next, text.len());

        // Nothing left but the end of input
        let err = read(text, next).unwrap_err();
        assert!(matches!(
            err,
            Error::SyntaxError(SyntaxError {
                kind: SyntaxErrorKind::UnexpectedEnd,
                position: 9,
                ..
            })
        ));

        // A symbol stops at a delimiter without consuming it
        assert_eq!(read("foo]", 0).unwrap(), (sym("foo"), 3));
        assert_eq!(read("a,b", 0).unwrap(), (sym("a"), 1));
    }

    #[test]
    fn test_read_invalid_start_index() {
        for (text, start) in [("abc", 10), ("é", 1)] {
            let err = read(text, start).unwrap_err();
            assert!(
                matches!(
                    &err,
                    Error::SyntaxError(SyntaxError {
                        kind: SyntaxErrorKind::InvalidStartIndex,
                        position,
                        ..
                    }) if *position == start
                ),
                "unexpected result for {text:?} at {start}: {err:?}"
            );
        }
    }

    #[test]
    fn test_read_arbitrary_precision() {
        // 309 significant digits, beyond what any float keeps
        let digits = format!("1{}", "7".repeat(308));
        let value = read_fully(&digits).unwrap();
        let Value::Number(n) = &value else {
            panic!("expected number, got {value:?}");
        };
        assert_eq!(n.to_plain_string(), digits);

        let fractional = format!("0.{}1", "0".repeat(40));
        let value = read_fully(&fractional).unwrap();
        let Value::Number(n) = &value else {
            panic!("expected number, got {value:?}");
        };
        assert_eq!(n.to_plain_string(), fractional);
    }
}
