//! Lexer and parser for the operator console.
//!
//! The lexer uses `regal` to produce a bounded token stream, and the parser
//! composes `winnow` combinators over those tokens to walk the catalog
//! grammar.

use core::fmt;
use core::ops::Range;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
use winnow::combinator::{alt, opt, repeat};
#[allow(deprecated)]
use winnow::error::ErrorKind;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;

use super::catalog::{self, CommandTag, Node};
use crate::ActuatorId;

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 48;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Most stage durations accepted by a single `assign`.
pub const MAX_STAGE_ARGS: usize = 16;

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Time literal ending in `ms`, `s`, or `m`.
    #[regex(r"-?[0-9]+(?:\.[0-9]+)?(?:ms|s|m)", priority = 2)]
    Duration,
    /// Unsuffixed numeric literal.
    #[regex(r"-?[0-9]+(?:\.[0-9]+)?")]
    Number,
    /// Identifier or keyword (case-insensitive match performed later).
    #[regex(r"[A-Za-z][A-Za-z0-9-]*")]
    Ident,
    /// Optional separator between durations.
    #[token(",")]
    Comma,
    /// Inline whitespace is ignored.
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Pseudo variant used when the lexer encounters unsupported input.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Bounded token buffer for one console line.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Stage durations, in seconds, collected by `assign`.
pub type DurationList = HeaplessVec<f64, MAX_STAGE_ARGS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the static buffer allows.
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => write!(f, "lexer engine error"),
        }
    }
}

/// Grammar errors emitted by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: Option<TokenKind>,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InvalidActuator {
        span: Range<usize>,
    },
    InvalidDuration {
        span: Range<usize>,
    },
    TooManyValues {
        limit: usize,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::InvalidActuator { span } => {
                write!(f, "invalid actuator id at {span:?}")
            }
            GrammarErrorKind::InvalidDuration { span } => {
                write!(f, "invalid duration literal at {span:?}")
            }
            GrammarErrorKind::TooManyValues { limit } => {
                write!(f, "at most {limit} durations are accepted")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

/// Wrapper type enabling a consistent error surface for consumers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) if tok.kind != TokenKind::Eol => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: Some(tok.kind),
                    span: tok.span.clone(),
                },
                _ => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn invalid_actuator(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidActuator {
                span: token.span.clone(),
            },
        }
    }

    fn invalid_duration(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidDuration {
                span: token.span.clone(),
            },
        }
    }

    fn too_many_values() -> Self {
        GrammarError {
            kind: GrammarErrorKind::TooManyValues {
                limit: MAX_STAGE_ARGS,
            },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

#[allow(deprecated)]
impl<'src, 'slice> ParserError<Input<'src, 'slice>> for GrammarError<'src>
where
    'src: 'slice,
{
    fn from_error_kind(input: &Input<'src, 'slice>, _kind: ErrorKind) -> Self {
        GrammarError::unexpected("token", input.first())
    }

    fn append(
        self,
        _input: &Input<'src, 'slice>,
        _token_start: &<Input<'src, 'slice> as Stream>::Checkpoint,
        _kind: ErrorKind,
    ) -> Self {
        self
    }

    fn or(self, other: Self) -> Self {
        other
    }
}

type StepResult<'src, T = ()> = Result<T, ErrMode<GrammarError<'src>>>;

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq)]
pub enum Command<'a> {
    Assign(AssignCommand),
    Run(RunCommand),
    Status,
    Describe,
    Help(HelpCommand<'a>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignCommand {
    pub actuator: ActuatorId,
    pub durations: DurationList,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunCommand {
    /// Seconds of simulated time to advance.
    pub duration: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

pub(crate) fn parse_tokens_partial<'src, 'slice>(
    tokens: &'slice [Token<'src>],
) -> Result<(Command<'src>, &'slice [Token<'src>]), GrammarError<'src>>
where
    'src: 'slice,
{
    let mut input = tokens;
    match command().parse_next(&mut input) {
        Ok(cmd) => Ok((cmd, input)),
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => Err(err),
        Err(ErrMode::Incomplete(_)) => Err(GrammarError::unexpected("token", input.first())),
    }
}

/// Tokenize the provided line.
///
/// # Errors
///
/// Returns [`LexError::TooManyTokens`] when the line does not fit in a
/// [`TokenBuffer`].
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        push_token(
            &mut buffer,
            Token {
                kind: record.token,
                lexeme,
                span,
            },
        )?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let end = start + partial.fragment.len();
        push_token(
            &mut buffer,
            Token {
                kind: TokenKind::Error,
                lexeme: partial.fragment,
                span: start..end,
            },
        )?;
    }

    Ok(buffer)
}

fn push_token<'a>(buffer: &mut TokenBuffer<'a>, token: Token<'a>) -> Result<(), LexError> {
    buffer.push(token).map_err(|_| LexError::TooManyTokens {
        processed: buffer.len() + 1,
    })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a console command from the provided line.
///
/// # Errors
///
/// Returns [`ParseError::Lex`] when the line cannot be tokenized and
/// [`ParseError::Grammar`] when the tokens do not form a known command.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let (command, mut rest) =
        parse_tokens_partial(tokens.as_slice()).map_err(ParseError::Grammar)?;

    while let Some((token, remaining)) = rest.split_first() {
        if token.kind == TokenKind::Eol {
            rest = remaining;
        } else {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "end of command",
                Some(token),
            )));
        }
    }

    Ok(command)
}

fn command<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, Command<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let snapshot = *input;
        let command_token = expect_kind(TokenKind::Ident, "command keyword").parse_next(input)?;

        if let Some(spec) = catalog::find(command_token.lexeme) {
            let mut state = CommandState::new(spec.tag);
            parse_node(spec.grammar, input, &mut state)?;
            state.finish()
        } else {
            *input = snapshot;
            Err(ErrMode::Backtrack(GrammarError::unexpected(
                "command keyword",
                Some(&command_token),
            )))
        }
    }
}

fn parse_node<'src, 'slice>(
    node: &'static Node,
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> StepResult<'src>
where
    'src: 'slice,
{
    match node {
        Node::End => Ok(()),
        Node::Actuator { next } => {
            let token = expect_kind(TokenKind::Number, "actuator id").parse_next(input)?;
            let actuator = parse_actuator(&token).map_err(ErrMode::Cut)?;
            state.set_actuator(actuator);
            parse_node(next, input, state)
        }
        Node::Duration { next } => {
            let seconds = time_value("duration").parse_next(input)?;
            state.push_duration(seconds)?;
            parse_node(next, input, state)
        }
        Node::Durations { min, next } => {
            parse_duration_list(input, *min, state)?;
            parse_node(next, input, state)
        }
        Node::Topic { next } => {
            parse_topic(input, state)?;
            parse_node(next, input, state)
        }
    }
}

/// Durations separated by whitespace or commas; a comma never leads.
fn parse_duration_list<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    min: usize,
    state: &mut CommandState<'src>,
) -> StepResult<'src>
where
    'src: 'slice,
{
    let mut seen = false;
    let element = |input: &mut Input<'src, 'slice>| -> StepResult<'src> {
        if seen {
            let _ = opt(expect_kind(TokenKind::Comma, ",")).parse_next(input)?;
        }
        let seconds = time_value("duration").parse_next(input)?;
        state.push_duration(seconds)?;
        seen = true;
        Ok(())
    };
    let parsed: usize = repeat(0.., element).parse_next(input)?;

    if parsed < min {
        return Err(ErrMode::Backtrack(GrammarError::unexpected(
            "duration",
            input.first(),
        )));
    }
    Ok(())
}

fn parse_topic<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> StepResult<'src>
where
    'src: 'slice,
{
    let topic = opt(expect_kind(TokenKind::Ident, "identifier")).parse_next(input)?;
    state.set_topic(topic.as_ref().map(|token| token.lexeme));

    match input.first() {
        Some(token) if topic.is_none() && token.kind != TokenKind::Eol => Err(ErrMode::Backtrack(
            GrammarError::unexpected("identifier", Some(token)),
        )),
        _ => Ok(()),
    }
}

/// One time literal, suffixed or bare, converted to seconds.
fn time_value<'src, 'slice>(
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, f64, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let token = alt((
            expect_kind(TokenKind::Duration, label),
            expect_kind(TokenKind::Number, label),
        ))
        .parse_next(input)?;
        parse_seconds(&token).map_err(ErrMode::Cut)
    }
}

enum CommandState<'a> {
    Assign {
        actuator: Option<ActuatorId>,
        durations: DurationList,
    },
    Run {
        duration: Option<f64>,
    },
    Status,
    Describe,
    Help {
        topic: Option<&'a str>,
    },
}

impl<'a> CommandState<'a> {
    fn new(tag: CommandTag) -> Self {
        match tag {
            CommandTag::Assign => CommandState::Assign {
                actuator: None,
                durations: DurationList::new(),
            },
            CommandTag::Run => CommandState::Run { duration: None },
            CommandTag::Status => CommandState::Status,
            CommandTag::Describe => CommandState::Describe,
            CommandTag::Help => CommandState::Help { topic: None },
        }
    }

    fn set_actuator(&mut self, id: ActuatorId) {
        if let CommandState::Assign { actuator, .. } = self {
            *actuator = Some(id);
        }
    }

    fn push_duration(&mut self, seconds: f64) -> StepResult<'a> {
        match self {
            CommandState::Assign { durations, .. } => durations
                .push(seconds)
                .map_err(|_| ErrMode::Cut(GrammarError::too_many_values())),
            CommandState::Run { duration } => {
                *duration = Some(seconds);
                Ok(())
            }
            _ => Err(ErrMode::Backtrack(GrammarError::unexpected(
                "end of command",
                None,
            ))),
        }
    }

    fn set_topic(&mut self, topic: Option<&'a str>) {
        if let CommandState::Help { topic: slot } = self {
            *slot = topic;
        }
    }

    fn finish(self) -> StepResult<'a, Command<'a>> {
        match self {
            CommandState::Assign {
                actuator: Some(actuator),
                durations,
            } => Ok(Command::Assign(AssignCommand {
                actuator,
                durations,
            })),
            CommandState::Run {
                duration: Some(duration),
            } => Ok(Command::Run(RunCommand { duration })),
            CommandState::Status => Ok(Command::Status),
            CommandState::Describe => Ok(Command::Describe),
            CommandState::Help { topic } => Ok(Command::Help(HelpCommand { topic })),
            CommandState::Assign { actuator: None, .. } => Err(ErrMode::Backtrack(
                GrammarError::unexpected("actuator id", None),
            )),
            CommandState::Run { duration: None } => Err(ErrMode::Backtrack(
                GrammarError::unexpected("duration", None),
            )),
        }
    }
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(label, None))),
    }
}

fn parse_actuator<'a>(token: &Token<'a>) -> Result<ActuatorId, GrammarError<'a>> {
    token
        .lexeme
        .parse::<ActuatorId>()
        .map_err(|_| GrammarError::invalid_actuator(token))
}

/// Converts a time literal to seconds. Bare numbers are seconds.
fn parse_seconds<'a>(token: &Token<'a>) -> Result<f64, GrammarError<'a>> {
    let text = token.lexeme;
    let (digits, scale) = if let Some(rest) = text.strip_suffix("ms") {
        (rest, 0.001)
    } else if let Some(rest) = text.strip_suffix('s') {
        (rest, 1.0)
    } else if let Some(rest) = text.strip_suffix('m') {
        (rest, 60.0)
    } else {
        (text, 1.0)
    };

    match digits.parse::<f64>() {
        Ok(value) if (value * scale).is_finite() => Ok(value * scale),
        _ => Err(GrammarError::invalid_duration(token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Command<'_> {
        parse(input).expect("command should parse")
    }

    fn close(lhs: f64, rhs: f64) -> bool {
        (lhs - rhs).abs() < 1e-9
    }

    #[test]
    fn parses_assign_with_mixed_units() {
        match parse_ok("assign 10 30 25s 1500ms") {
            Command::Assign(AssignCommand {
                actuator,
                durations,
            }) => {
                assert_eq!(actuator, 10);
                assert_eq!(durations.len(), 3);
                assert!(close(durations[0], 30.0));
                assert!(close(durations[1], 25.0));
                assert!(close(durations[2], 1.5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_comma_separated_durations() {
        match parse_ok("assign 3 20s, 40s\n") {
            Command::Assign(AssignCommand { durations, .. }) => {
                assert_eq!(durations.len(), 2);
                assert!(close(durations[1], 40.0));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn assign_rejects_leading_comma() {
        match parse("assign 3 ,20s") {
            Err(ParseError::Grammar(err)) => assert!(matches!(
                err.kind,
                GrammarErrorKind::UnexpectedToken {
                    expected: "duration",
                    found: Some(TokenKind::Comma),
                    ..
                }
            )),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn duration_list_stops_before_trailing_comma() {
        match parse("assign 3 20s,") {
            Err(ParseError::Grammar(err)) => assert!(matches!(
                err.kind,
                GrammarErrorKind::UnexpectedToken {
                    expected: "end of command",
                    found: Some(TokenKind::Comma),
                    ..
                }
            )),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn assign_requires_a_duration() {
        match parse("assign 3") {
            Err(ParseError::Grammar(err)) => assert_eq!(
                err.kind,
                GrammarErrorKind::UnexpectedEnd {
                    expected: "duration"
                }
            ),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn assign_rejects_fractional_actuator() {
        match parse("assign 1.5 10") {
            Err(ParseError::Grammar(err)) => {
                assert!(matches!(err.kind, GrammarErrorKind::InvalidActuator { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn negative_durations_reach_the_executor() {
        match parse_ok("assign 2 -5") {
            Command::Assign(AssignCommand { durations, .. }) => {
                assert!(close(durations[0], -5.0));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn assign_caps_duration_count() {
        let line = "assign 1 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17";
        match parse(line) {
            Err(ParseError::Grammar(err)) => assert_eq!(
                err.kind,
                GrammarErrorKind::TooManyValues {
                    limit: MAX_STAGE_ARGS
                }
            ),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn parses_run_in_minutes() {
        match parse_ok("run 2m") {
            Command::Run(RunCommand { duration }) => assert!(close(duration, 120.0)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_rejects_trailing_tokens() {
        match parse("run 10 20") {
            Err(ParseError::Grammar(err)) => {
                assert!(matches!(
                    err.kind,
                    GrammarErrorKind::UnexpectedToken {
                        expected: "end of command",
                        ..
                    }
                ));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn parses_status_and_describe() {
        assert_eq!(parse_ok("status"), Command::Status);
        assert_eq!(parse_ok("DESCRIBE\r\n"), Command::Describe);
    }

    #[test]
    fn parses_help_topic() {
        assert_eq!(
            parse_ok("help assign"),
            Command::Help(HelpCommand {
                topic: Some("assign"),
            })
        );
        assert_eq!(parse_ok("help"), Command::Help(HelpCommand { topic: None }));
        assert!(parse("help 5").is_err());
    }

    #[test]
    fn unknown_command_is_rejected() {
        match parse("reboot now") {
            Err(ParseError::Grammar(err)) => {
                assert!(matches!(
                    err.kind,
                    GrammarErrorKind::UnexpectedToken {
                        expected: "command keyword",
                        ..
                    }
                ));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_token() {
        match parse("run 10$") {
            Err(ParseError::Grammar(err)) => {
                assert!(matches!(err.kind, GrammarErrorKind::InvalidToken { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn lexer_emits_error_token_for_unknown_symbol() {
        let tokens = lex("status$").expect("lexing should succeed");
        let last = tokens.last().expect("expected at least one token");
        assert_eq!(last.kind, TokenKind::Error);
        assert_eq!(last.lexeme, "$");
    }

    #[test]
    fn lexer_splits_time_literals() {
        let tokens = lex("run 250ms").expect("lexing should succeed");
        let kinds: Vec<TokenKind> = tokens.iter().map(|token| token.kind).collect();
        assert_eq!(kinds, vec![TokenKind::Ident, TokenKind::Duration]);
    }
}
