use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Immutable identity of one examination-record lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawQueryKey")]
pub struct QueryKey {
    roll: String,
    regulation: String,
    program: String,
}

impl QueryKey {
    pub const MAX_ROLL_LEN: usize = 16;
    pub const MAX_PROGRAM_LEN: usize = 128;

    pub fn new(
        roll: impl AsRef<str>,
        regulation: impl AsRef<str>,
        program: impl AsRef<str>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            roll: validate_roll(roll.as_ref())?,
            regulation: validate_regulation(regulation.as_ref())?,
            program: validate_program(program.as_ref())?,
        })
    }

    pub fn roll(&self) -> &str {
        &self.roll
    }

    pub fn regulation(&self) -> &str {
        &self.regulation
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Wire shape of a key before validation.
#[derive(Deserialize)]
struct RawQueryKey {
    roll: String,
    regulation: String,
    program: String,
}

impl TryFrom<RawQueryKey> for QueryKey {
    type Error = ValidationError;

    fn try_from(raw: RawQueryKey) -> Result<Self, Self::Error> {
        Self::new(raw.roll, raw.regulation, raw.program)
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.program, self.regulation, self.roll)
    }
}

fn validate_roll(input: &str) -> Result<String, ValidationError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(ValidationError::EmptyRoll);
    }

    if value.len() > QueryKey::MAX_ROLL_LEN {
        return Err(ValidationError::RollTooLong {
            len: value.len(),
            max: QueryKey::MAX_ROLL_LEN,
        });
    }

    for (index, ch) in value.chars().enumerate() {
        if !ch.is_ascii_alphanumeric() {
            return Err(ValidationError::RollInvalidChar { ch, index });
        }
    }

    Ok(value.to_owned())
}

fn validate_regulation(input: &str) -> Result<String, ValidationError> {
    let value = input.trim();
    if value.len() != 4 || !value.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::InvalidRegulation {
            value: input.to_owned(),
        });
    }

    Ok(value.to_owned())
}

fn validate_program(input: &str) -> Result<String, ValidationError> {
    let value = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if value.is_empty() {
        return Err(ValidationError::EmptyProgram);
    }

    let len = value.chars().count();
    if len > QueryKey::MAX_PROGRAM_LEN {
        return Err(ValidationError::ProgramTooLong {
            len,
            max: QueryKey::MAX_PROGRAM_LEN,
        });
    }

    Ok(value)
}
