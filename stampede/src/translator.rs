//! Scenario language compiler.
//!
//! Scenario text is a sequence of statements such as
//!
//! ```text
//! ## Ramp up, hold, ramp down ##
//! CreateLoopedUsersOverTime(amount: 100, minutes: 1);
//! Delay(minutes: 5);
//! Repeat(times: 2) {
//!     CreateUsers(amount: 10);
//!     Delay(seconds: 30);
//! }
//! RemoveLoopedUsersOverTime(amount: 100, seconds: 30);
//! WaitForAllClientsToFinish();
//! ```
//!
//! Whitespace is insignificant, `##` pairs delimit comments and keywords and parameter names are
//! case-insensitive. Block commands (`Repeat`) take a `{...}` body; every other statement ends in
//! `;`.
use crate::scenario::WorkUnit;
use stampede_core::{CompileError, COMMENT_MARKER};
use std::collections::HashMap;
use std::fmt;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

mod commands;
mod params;

pub use params::Params;

/// Compiles one statement. May push work units itself (block commands) or return one to append.
pub type Handler =
    fn(&Statement<'_>, &Translator, &mut Vec<WorkUnit>) -> Result<Option<WorkUnit>, CompileError>;

/// How the extent of a statement is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// `keyword(args);`
    Simple,
    /// `keyword(args){body}`
    Block,
}

#[derive(Clone, Copy)]
pub struct Command {
    pub syntax: Syntax,
    pub handler: Handler,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("syntax", &self.syntax)
            .finish_non_exhaustive()
    }
}

/// Keyword to handler mapping. [`Default`] holds the built-in commands.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
}

impl CommandRegistry {
    pub fn empty() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Register a command. Keywords are case-insensitive and may only be registered once.
    pub fn register(
        &mut self,
        keyword: &str,
        syntax: Syntax,
        handler: Handler,
    ) -> Result<(), CompileError> {
        let keyword = keyword.to_lowercase();
        if self.commands.contains_key(&keyword) {
            return Err(CompileError::DuplicateCommand(keyword));
        }
        self.commands.insert(keyword, Command { syntax, handler });
        Ok(())
    }

    pub fn resolve(&self, keyword: &str) -> Option<&Command> {
        self.commands.get(keyword)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for (keyword, syntax, handler) in commands::BUILTIN {
            registry.commands.insert(
                keyword.to_string(),
                Command {
                    syntax: *syntax,
                    handler: *handler,
                },
            );
        }
        registry
    }
}

/// One located statement of normalized scenario text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statement<'a> {
    keyword: &'a str,
    text: &'a str,
    args: &'a str,
    body: Option<&'a str>,
}

impl<'a> Statement<'a> {
    pub fn keyword(&self) -> &'a str {
        self.keyword
    }

    /// The whole statement, terminator included.
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Text between the parentheses.
    pub fn args(&self) -> &'a str {
        self.args
    }

    /// Text between the braces of a block statement.
    pub fn body(&self) -> Option<&'a str> {
        self.body
    }

    pub fn malformed(&self, reason: &'static str) -> CompileError {
        CompileError::Malformed {
            statement: self.text.to_string(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Translator {
    registry: CommandRegistry,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: CommandRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Compile scenario text into work units in execution order.
    ///
    /// Nothing is produced unless every statement compiles.
    pub fn compile(&self, scenario: &str) -> Result<Vec<WorkUnit>, CompileError> {
        let normalized = normalize(scenario)?;
        let mut units = vec![];
        self.compile_block(&normalized, &mut units)?;
        debug!("Compiled scenario into {} work unit(s)", units.len());
        Ok(units)
    }

    /// Compile already normalized text, appending to `out`. Used by block commands to expand
    /// their body in place.
    pub fn compile_block(&self, text: &str, out: &mut Vec<WorkUnit>) -> Result<(), CompileError> {
        let mut rest = text;
        while !rest.is_empty() {
            let (statement, remainder) = self.next_statement(rest)?;
            trace!("Compiling '{}'", statement.text());

            let command = self.command(statement.keyword(), statement.text())?;
            if let Some(unit) = (command.handler)(&statement, self, out)? {
                out.push(unit);
            }
            rest = remainder;
        }
        Ok(())
    }

    fn command(&self, keyword: &str, statement: &str) -> Result<&Command, CompileError> {
        self.registry
            .resolve(keyword)
            .ok_or_else(|| CompileError::UnknownCommand {
                keyword: keyword.to_string(),
                statement: statement.to_string(),
            })
    }

    fn next_statement<'a>(&self, input: &'a str) -> Result<(Statement<'a>, &'a str), CompileError> {
        let malformed = |reason| CompileError::Malformed {
            statement: input.to_string(),
            reason,
        };

        let open = input
            .find('(')
            .ok_or_else(|| malformed("expected '(' after the command name"))?;
        let keyword = &input[..open];

        let syntax = self
            .command(keyword, up_to_terminator(input))?
            .syntax;

        let close = open
            + input[open..]
                .find(')')
                .ok_or_else(|| malformed("expected ')' after the arguments"))?;
        let args = &input[open + 1..close];
        let after = close + 1;

        let (end, body) = match syntax {
            Syntax::Simple => {
                if !input[after..].starts_with(';') {
                    return Err(malformed("expected ';' after the arguments"));
                }
                (after, None)
            }
            Syntax::Block => {
                if !input[after..].starts_with('{') {
                    return Err(malformed("expected '{' after the arguments"));
                }
                let closing = matching_brace(input, after)
                    .ok_or_else(|| malformed("block is missing its closing '}'"))?;
                // A trailing ';' after a block is tolerated.
                let end = if input[closing + 1..].starts_with(';') {
                    closing + 1
                } else {
                    closing
                };
                (end, Some(&input[after + 1..closing]))
            }
        };

        let statement = Statement {
            keyword,
            text: &input[..=end],
            args,
            body,
        };
        Ok((statement, &input[end + 1..]))
    }
}

/// Strip whitespace and comments, then case-fold.
pub(crate) fn normalize(scenario: &str) -> Result<String, CompileError> {
    let stripped: String = scenario.chars().filter(|c| !c.is_whitespace()).collect();

    let mut normalized = String::with_capacity(stripped.len());
    let mut rest = stripped.as_str();
    while let Some(start) = rest.find(COMMENT_MARKER) {
        normalized.push_str(&rest[..start]);
        let comment = &rest[start + COMMENT_MARKER.len()..];
        let end = comment
            .find(COMMENT_MARKER)
            .ok_or(CompileError::UnterminatedComment)?;
        rest = &comment[end + COMMENT_MARKER.len()..];
    }
    normalized.push_str(rest);

    Ok(normalized.to_lowercase())
}

fn up_to_terminator(input: &str) -> &str {
    match input.find(';') {
        Some(end) => &input[..=end],
        None => input,
    }
}

/// Index of the `}` closing the `{` at `open`.
fn matching_brace(input: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in input[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}
