//! Mapping file parser.
//!
//! The mapping file is the source of the trigger table. It is line oriented:
//!
//! ```text
//! # comment
//! map <Up> <VolumeUp>
//! cmd <Play><Down> open -a Terminal
//! mode <Play><Up> {
//!     map <Up> k
//!     map <Down> j
//! }
//! ```
//!
//! - `map` types the keys after the trigger. Literal characters type
//!   themselves, `<Name>` is a special key, `<C-a>` adds modifiers (`C`
//!   control, `A` alt, `S` shift, `D` meta) and `\\` / `\<` escape.
//! - `cmd` runs the rest of the line through the shell.
//! - `mode` declares a mode named after its trigger. Pressing the trigger
//!   toggles the mode; the mappings inside the block are only visible while
//!   it is active and shadow global mappings with the same trigger.
//!
//! The parser performs no semantic checks (duplicates, conflicts); those
//! happen when the resulting [`MappingSet`] is built into a table.

use std::path::Path;

use anyhow::{Context, Result};
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{anychar, char, none_of, space0, space1},
    combinator::{eof, map_opt, rest, value},
    multi::{many0, many1},
    sequence::{delimited, terminated},
    IResult, Parser,
};
use thiserror::Error;
use tracing::warn;

use crate::button::HeadphoneButton;
use crate::keys::{Key, KeyStroke, Modifiers};
use crate::trigger_table::{
    ActionKind, MappingSet, ModeAction, ModeId, Trigger, TriggerTableEntry,
};

/// Parse errors with line number context
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: expected `map`, `cmd`, `mode` or `}}`: {text}")]
    InvalidSyntax { line: usize, text: String },

    #[error("line {line}: unknown key '<{name}>'")]
    UnknownKey { line: usize, name: String },

    #[error("line {line}: could not read key sequence at '{rest}'")]
    InvalidKeys { line: usize, rest: String },

    #[error("line {line}: mode blocks cannot be nested")]
    NestedMode { line: usize },

    #[error("line {line}: `}}` without an open mode block")]
    UnexpectedClose { line: usize },

    #[error("mode block opened on line {line} is never closed")]
    UnclosedMode { line: usize },
}

#[derive(Debug)]
enum Line<'a> {
    Map(Trigger, &'a str),
    Command(Trigger, &'a str),
    ModeOpen(Trigger),
    ModeClose,
}

#[derive(Debug)]
enum Token<'a> {
    Char(char),
    Special { modifiers: Modifiers, name: &'a str },
}

/// Reads the mapping file at `path`.
///
/// A missing file yields the built-in headset defaults.
pub fn load(path: &Path) -> Result<MappingSet> {
    if !path.exists() {
        warn!(
            "No mapping file found at '{}'. Using default mappings.",
            path.display()
        );
        return Ok(MappingSet::builtin());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping file: {}", path.display()))?;
    parse(&content).with_context(|| format!("Failed to parse mapping file: {}", path.display()))
}

/// Parses mapping file contents into an unvalidated [`MappingSet`].
pub fn parse(content: &str) -> Result<MappingSet, ParseError> {
    let mut set = MappingSet::default();
    // Mode currently being defined, with the line its block opened on.
    let mut open_mode: Option<(ModeId, usize)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_num = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parsed = match line(trimmed) {
            Ok((_, parsed)) => parsed,
            Err(_) => {
                return Err(ParseError::InvalidSyntax {
                    line: line_num,
                    text: trimmed.to_string(),
                })
            }
        };

        let scope = open_mode.as_ref().map(|(id, _)| id.clone());
        let make_entry = |trigger: Trigger, action: ActionKind| match &scope {
            Some(id) => TriggerTableEntry::scoped(id.clone(), trigger, action),
            None => TriggerTableEntry::global(trigger, action),
        };

        match parsed {
            Line::Map(trigger, keys) => {
                let strokes = parse_keys(keys, line_num)?;
                set.entries.push(make_entry(trigger, ActionKind::Map(strokes)));
            }
            Line::Command(trigger, command) => {
                set.entries
                    .push(make_entry(trigger, ActionKind::Command(command.to_string())));
            }
            Line::ModeOpen(trigger) => {
                if open_mode.is_some() {
                    return Err(ParseError::NestedMode { line: line_num });
                }
                let id = ModeId::new(trigger.to_string());
                set.modes.push(id.clone());
                set.entries.push(TriggerTableEntry::global(
                    trigger.clone(),
                    ActionKind::Mode(id.clone(), ModeAction::Activate),
                ));
                set.entries.push(TriggerTableEntry::scoped(
                    id.clone(),
                    trigger,
                    ActionKind::Mode(id.clone(), ModeAction::Deactivate),
                ));
                open_mode = Some((id, line_num));
            }
            Line::ModeClose => {
                if open_mode.take().is_none() {
                    return Err(ParseError::UnexpectedClose { line: line_num });
                }
            }
        }
    }

    if let Some((_, line)) = open_mode {
        return Err(ParseError::UnclosedMode { line });
    }
    Ok(set)
}

fn line(input: &str) -> IResult<&str, Line<'_>> {
    alt((
        (tag("map"), space1, trigger, space1, rest).map(|(_, _, t, _, keys)| Line::Map(t, keys)),
        (tag("cmd"), space1, trigger, space1, rest)
            .map(|(_, _, t, _, command)| Line::Command(t, command)),
        (tag("mode"), space1, trigger, space0, char('{'), space0, eof)
            .map(|(_, _, t, _, _, _, _)| Line::ModeOpen(t)),
        (char('}'), space0, eof).map(|_| Line::ModeClose),
    ))
    .parse(input)
}

fn trigger(input: &str) -> IResult<&str, Trigger> {
    many1(headphone_button).map(Trigger::new).parse(input)
}

fn headphone_button(input: &str) -> IResult<&str, HeadphoneButton> {
    delimited(
        char('<'),
        alt((
            value(HeadphoneButton::Play, tag_no_case("play")),
            value(HeadphoneButton::Up, tag_no_case("up")),
            value(HeadphoneButton::Down, tag_no_case("down")),
        )),
        char('>'),
    )
    .parse(input)
}

/// Converts a `map` action into key strokes.
fn parse_keys(input: &str, line: usize) -> Result<Vec<KeyStroke>, ParseError> {
    let (remaining, tokens) = many0(key_token)
        .parse(input)
        .map_err(|_: nom::Err<nom::error::Error<&str>>| ParseError::InvalidKeys {
            line,
            rest: input.to_string(),
        })?;
    if !remaining.is_empty() {
        return Err(ParseError::InvalidKeys {
            line,
            rest: remaining.to_string(),
        });
    }

    tokens
        .into_iter()
        .map(|token| match token {
            Token::Char(c) => Ok(KeyStroke::plain(Key::Char(c))),
            Token::Special { modifiers, name } => {
                let mut chars = name.chars();
                let key = match (Key::from_name(name), chars.next(), chars.next()) {
                    (Some(key), _, _) => key,
                    (None, Some(c), None) => Key::Char(c),
                    _ => {
                        return Err(ParseError::UnknownKey {
                            line,
                            name: name.to_string(),
                        })
                    }
                };
                Ok(KeyStroke::new(key, modifiers))
            }
        })
        .collect()
}

fn key_token(input: &str) -> IResult<&str, Token<'_>> {
    alt((special_key, plain_char.map(Token::Char))).parse(input)
}

fn plain_char(input: &str) -> IResult<&str, char> {
    alt((
        value('\\', tag("\\\\")),
        value('<', tag("\\<")),
        none_of("<\\"),
    ))
    .parse(input)
}

fn special_key(input: &str) -> IResult<&str, Token<'_>> {
    delimited(
        char('<'),
        (many0(modifier), take_while1(|c: char| c != '>')),
        char('>'),
    )
    .map(|(mods, name): (Vec<Modifiers>, &str)| Token::Special {
        modifiers: mods.into_iter().fold(Modifiers::empty(), |acc, m| acc | m),
        name,
    })
    .parse(input)
}

fn modifier(input: &str) -> IResult<&str, Modifiers> {
    map_opt(terminated(anychar, char('-')), Modifiers::from_prefix).parse(input)
}
