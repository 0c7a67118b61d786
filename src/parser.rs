use std::path::PathBuf;

use crate::ast::{Pipeline, Stage};

/// A lexical unit of a command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(String),
    /// `|`
    Pipe,
    /// `<`
    RedirectIn,
    /// `>`
    RedirectOut,
    /// `&`
    Background,
}

/// States for the tokenizer state machine.
enum State {
    /// Between tokens — whitespace is skipped
    Normal,
    /// Building an unquoted word — whitespace or an operator ends it
    InWord,
    /// Inside double quotes — whitespace and operators are literal
    InDoubleQuote,
    /// Inside single quotes — everything is literal
    InSingleQuote,
}

fn operator(ch: char) -> Option<Token> {
    match ch {
        '|' => Some(Token::Pipe),
        '<' => Some(Token::RedirectIn),
        '>' => Some(Token::RedirectOut),
        '&' => Some(Token::Background),
        _ => None,
    }
}

/// Split a command line into words and operators.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match (&state, ch) {
            // ── Normal / InWord: unquoted text ──
            (State::Normal | State::InWord, ' ' | '\t' | '\n' | '\r') => {
                if matches!(state, State::InWord) {
                    tokens.push(Token::Word(std::mem::take(&mut current)));
                }
                state = State::Normal;
            }
            (State::Normal | State::InWord, '"') => state = State::InDoubleQuote,
            (State::Normal | State::InWord, '\'') => state = State::InSingleQuote,
            (State::Normal | State::InWord, '\\') => {
                current.push(chars.next().unwrap_or('\\'));
                state = State::InWord;
            }
            (State::Normal | State::InWord, c) => match operator(c) {
                Some(op) => {
                    if matches!(state, State::InWord) {
                        tokens.push(Token::Word(std::mem::take(&mut current)));
                    }
                    tokens.push(op);
                    state = State::Normal;
                }
                None => {
                    current.push(c);
                    state = State::InWord;
                }
            },

            // ── Quoted text: a closing quote returns to the word ──
            (State::InDoubleQuote, '"') | (State::InSingleQuote, '\'') => state = State::InWord,
            (State::InDoubleQuote, '\\') => match chars.clone().next() {
                Some(next @ ('"' | '\\')) => {
                    chars.next();
                    current.push(next);
                }
                _ => current.push('\\'),
            },
            (State::InDoubleQuote | State::InSingleQuote, c) => current.push(c),
        }
    }

    // Unclosed quotes keep what was collected.
    if !matches!(state, State::Normal) {
        tokens.push(Token::Word(current));
    }

    tokens
}

/// Parse a command line into a pipeline.
///
/// Returns `Ok(None)` for a blank line and `Err` with a message for a
/// malformed one (dangling operator, empty stage).
pub fn parse(line: &str) -> Result<Option<Pipeline>, String> {
    let text = line.trim_end_matches(['\n', '\r']).to_string();
    let mut tokens = tokenize(&text).into_iter().peekable();
    if tokens.peek().is_none() {
        return Ok(None);
    }

    let mut stages = Vec::new();
    let mut stage = Stage::default();
    let mut background = false;

    while let Some(token) = tokens.next() {
        if background {
            return Err("syntax error: '&' must end the command".to_string());
        }
        match token {
            Token::Word(word) => stage.argv.push(word),
            Token::RedirectIn => stage.input = Some(expect_path(tokens.next(), "<")?),
            Token::RedirectOut => stage.output = Some(expect_path(tokens.next(), ">")?),
            Token::Pipe => {
                if stage.argv.is_empty() {
                    return Err("syntax error near '|'".to_string());
                }
                stages.push(std::mem::take(&mut stage));
            }
            Token::Background => background = true,
        }
    }

    if stage.argv.is_empty() {
        if stages.is_empty() && stage.input.is_none() && stage.output.is_none() {
            return Ok(None);
        }
        return Err("syntax error: missing command".to_string());
    }
    stages.push(stage);

    Ok(Some(Pipeline {
        stages,
        background,
        text,
    }))
}

fn expect_path(token: Option<Token>, operator: &str) -> Result<PathBuf, String> {
    match token {
        Some(Token::Word(path)) => Ok(PathBuf::from(path)),
        _ => Err(format!("syntax error: expected filename after '{operator}'")),
    }
}
