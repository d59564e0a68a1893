use super::Statement;
use stampede_core::CompileError;
use std::str::FromStr;
use std::time::Duration;

const DURATION_UNITS: [(&str, u64); 3] = [("hours", 3_600_000), ("minutes", 60_000), ("seconds", 1_000)];

/// Named `name:value` arguments of a statement. Order is irrelevant and unknown names are ignored.
#[derive(Debug, Clone)]
pub struct Params<'a> {
    statement: &'a str,
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> Params<'a> {
    pub fn parse(statement: &Statement<'a>) -> Result<Self, CompileError> {
        let pairs = statement
            .args()
            .split(',')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                pair.split_once(':')
                    .ok_or_else(|| statement.malformed("arguments must be name:value pairs"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            statement: statement.text(),
            pairs,
        })
    }

    fn raw(&self, name: &str) -> Option<&'a str> {
        self.pairs
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }

    pub fn optional<T: FromStr>(&self, name: &str) -> Result<Option<T>, CompileError> {
        self.raw(name)
            .map(|value| {
                value.parse().map_err(|_| CompileError::InvalidParameter {
                    statement: self.statement.to_string(),
                    parameter: name.to_string(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    pub fn required<T: FromStr>(&self, name: &'static str) -> Result<T, CompileError> {
        self.optional(name)?
            .ok_or_else(|| CompileError::MissingParameter {
                statement: self.statement.to_string(),
                parameter: name,
            })
    }

    /// Sum of the optional `hours`, `minutes` and `seconds` parameters.
    pub fn duration(&self) -> Result<Duration, CompileError> {
        let mut millis = 0u64;
        for (unit, scale) in DURATION_UNITS {
            let Some(count) = self.optional::<u64>(unit)? else {
                continue;
            };
            millis = count
                .checked_mul(scale)
                .and_then(|part| millis.checked_add(part))
                .ok_or_else(|| CompileError::InvalidParameter {
                    statement: self.statement.to_string(),
                    parameter: unit.to_string(),
                    value: count.to_string(),
                })?;
        }
        Ok(Duration::from_millis(millis))
    }

    pub fn statement(&self) -> &'a str {
        self.statement
    }
}
