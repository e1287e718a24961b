use crate::parse::parse_command;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct PutCommand(pub String, pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCommand(pub String, pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCommand(pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct GetCommand(pub String);

/// One line of shell input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Put(PutCommand),
    Update(UpdateCommand),
    Delete(DeleteCommand),
    Get(GetCommand),
    /// Print every entry.
    List,
    /// Print the shape of the index.
    Stats,
    Exit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_command(s)
    }
}
