//! Placeholder key patterns (`$BIN/$PROCESS_$SYSTEMATIC`, ...).
//!
//! Every store key and datacard name derived from record fields goes
//! through [`KeyPattern::resolve`], so the text and binary outputs agree on
//! one substitution rule.

use cs_core::{Error, Result};

use crate::registry::{Observation, Process, Record, WILDCARD};

/// Closed set of placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// `$BIN`
    Bin,
    /// `$BINID`
    BinId,
    /// `$PROCESS`
    Process,
    /// `$MASS`
    Mass,
    /// `$SYSTEMATIC`
    Systematic,
    /// `$ANALYSIS`
    Analysis,
    /// `$CHANNEL`
    Channel,
    /// `$ERA`
    Era,
    /// `$#`: 1-based bin index inside a template.
    BinIndex,
}

// Longest names first so `$BINID` is not read as `$BIN` + `ID`.
const TOKENS: &[(&str, Token)] = &[
    ("SYSTEMATIC", Token::Systematic),
    ("ANALYSIS", Token::Analysis),
    ("CHANNEL", Token::Channel),
    ("PROCESS", Token::Process),
    ("BINID", Token::BinId),
    ("MASS", Token::Mass),
    ("BIN", Token::Bin),
    ("ERA", Token::Era),
    ("#", Token::BinIndex),
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Token(Token),
}

/// Values substituted into a pattern. Unset values are an error if the
/// pattern uses them.
#[derive(Debug, Clone, Default)]
pub struct KeyTokens<'a> {
    /// `$BIN`
    pub bin: Option<&'a str>,
    /// `$BINID`
    pub bin_id: Option<u32>,
    /// `$PROCESS`
    pub process: Option<&'a str>,
    /// `$MASS`
    pub mass: Option<&'a str>,
    /// `$SYSTEMATIC`, e.g. `jesUp`
    pub systematic: Option<&'a str>,
    /// `$ANALYSIS`
    pub analysis: Option<&'a str>,
    /// `$CHANNEL`
    pub channel: Option<&'a str>,
    /// `$ERA`
    pub era: Option<&'a str>,
    /// `$#`
    pub bin_index: Option<usize>,
}

impl<'a> KeyTokens<'a> {
    /// Tokens of a record. A `"*"` mass substitutes as the empty string.
    pub fn for_record<R: Record>(r: &'a R) -> Self {
        let mass = r.mass();
        Self {
            bin: Some(r.bin()),
            bin_id: Some(r.bin_id()),
            process: Some(r.process()),
            mass: Some(if mass == WILDCARD { "" } else { mass }),
            systematic: None,
            analysis: Some(r.analysis()),
            channel: Some(r.channel()),
            era: Some(r.era()),
            bin_index: None,
        }
    }

    /// Tokens of an observation.
    pub fn for_observation(o: &'a Observation) -> Self {
        Self::for_record(o)
    }

    /// Tokens of a process.
    pub fn for_process(p: &'a Process) -> Self {
        Self::for_record(p)
    }

    /// Set `$SYSTEMATIC`.
    pub fn with_systematic(mut self, systematic: &'a str) -> Self {
        self.systematic = Some(systematic);
        self
    }

    /// Set `$#`.
    pub fn with_bin_index(mut self, index: usize) -> Self {
        self.bin_index = Some(index);
        self
    }
}

/// A compiled placeholder pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    source: String,
    pieces: Vec<Piece>,
}

impl KeyPattern {
    /// Compile a pattern. Unknown `$` placeholders are a configuration error.
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;
        while let Some(pos) = rest.find('$') {
            literal.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let (name, token) = TOKENS
                .iter()
                .find(|(name, _)| after.starts_with(name))
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "unknown placeholder at '${}' in pattern '{}'",
                        after.chars().take(12).collect::<String>(),
                        pattern
                    ))
                })?;
            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            pieces.push(Piece::Token(*token));
            rest = &after[name.len()..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        if pieces.is_empty() {
            return Err(Error::Configuration("empty key pattern".into()));
        }
        Ok(Self { source: pattern.to_string(), pieces })
    }

    /// Whether `token` occurs in the pattern.
    pub fn uses(&self, token: Token) -> bool {
        self.pieces.iter().any(|p| *p == Piece::Token(token))
    }

    /// Substitute `tokens` into the pattern.
    pub fn resolve(&self, tokens: &KeyTokens<'_>) -> Result<String> {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(s) => out.push_str(s),
                Piece::Token(t) => {
                    let missing = || {
                        Error::Configuration(format!(
                            "pattern '{}' uses {:?} but no value was supplied",
                            self.source, t
                        ))
                    };
                    match t {
                        Token::Bin => out.push_str(tokens.bin.ok_or_else(missing)?),
                        Token::Process => out.push_str(tokens.process.ok_or_else(missing)?),
                        Token::Mass => out.push_str(tokens.mass.ok_or_else(missing)?),
                        Token::Systematic => out.push_str(tokens.systematic.ok_or_else(missing)?),
                        Token::Analysis => out.push_str(tokens.analysis.ok_or_else(missing)?),
                        Token::Channel => out.push_str(tokens.channel.ok_or_else(missing)?),
                        Token::Era => out.push_str(tokens.era.ok_or_else(missing)?),
                        Token::BinId => out.push_str(&tokens.bin_id.ok_or_else(missing)?.to_string()),
                        Token::BinIndex => {
                            out.push_str(&tokens.bin_index.ok_or_else(missing)?.to_string())
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}
