use crate::command::{Command, DeleteCommand, GetCommand, PutCommand, UpdateCommand};

/// Parses one shell line.
///
/// ## Grammar
/// - `GET key`
/// - `PUT key "value"`
/// - `UPDATE key "value"`
/// - `DELETE key`
/// - `LIST`, `STATS`, `EXIT`
///
/// Keywords are matched in upper or lower case. Values are double quoted and
/// may escape `"`, `\`, `n` and `t` with a backslash.
pub fn parse_command(input: &str) -> Result<Command, String> {
    let tokens = Lexer::new(input).lex()?;
    parse_tokens(tokens.into_iter())
}

#[derive(Debug, PartialEq)]
enum Keyword {
    Get,
    Put,
    Update,
    Delete,
    List,
    Stats,
    Exit,
}

#[derive(Debug, PartialEq)]
enum Token {
    Keyword(Keyword),
    Ident(String),
    Literal(String),
}

#[derive(Debug)]
struct Lexer {
    input: Vec<char>,
    pos: usize,
    buffer: String,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(input: &str) -> Lexer {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            buffer: String::new(),
            tokens: Vec::new(),
        }
    }

    fn lex(mut self) -> Result<Vec<Token>, String> {
        while let Some(c) = self.input.get(self.pos) {
            if c.is_whitespace() {
                self.pos += 1;
            } else if is_ident_char(*c) {
                self.lex_word()?;
            } else if c == &'"' {
                self.lex_literal()?;
            } else {
                return Err(format!("Unexpected character: {}", c));
            }
        }
        Ok(self.tokens)
    }

    fn lex_word(&mut self) -> Result<(), String> {
        while let Some(c) = self.input.get(self.pos) {
            self.pos += 1;
            if is_ident_char(*c) {
                self.buffer.push(*c);
            } else if c.is_whitespace() {
                break;
            } else {
                return Err(format!("Unexpected character: {}", c));
            }
        }

        let keyword = match self.buffer.as_str() {
            "GET" | "get" => Some(Keyword::Get),
            "PUT" | "put" => Some(Keyword::Put),
            "UPDATE" | "update" => Some(Keyword::Update),
            "DELETE" | "delete" => Some(Keyword::Delete),
            "LIST" | "list" => Some(Keyword::List),
            "STATS" | "stats" => Some(Keyword::Stats),
            "EXIT" | "exit" => Some(Keyword::Exit),
            _ => None,
        };
        let token = match keyword {
            Some(keyword) => Token::Keyword(keyword),
            None => Token::Ident(self.buffer.clone()),
        };
        self.tokens.push(token);
        self.buffer.clear();
        Ok(())
    }

    fn lex_literal(&mut self) -> Result<(), String> {
        // Skip the opening '"'
        self.pos += 1;

        let mut is_escaped = false;
        while let Some(c) = self.input.get(self.pos) {
            self.pos += 1;
            if is_escaped {
                let unescaped = match c {
                    '"' => '"',
                    '\\' => '\\',
                    'n' => '\n',
                    't' => '\t',
                    _ => return Err(format!("Invalid escaped character: {}", c)),
                };
                self.buffer.push(unescaped);
                is_escaped = false;
                continue;
            }
            match c {
                '"' => {
                    self.tokens.push(Token::Literal(self.buffer.clone()));
                    self.buffer.clear();
                    return Ok(());
                }
                '\\' => is_escaped = true,
                _ => self.buffer.push(*c),
            }
        }

        Err(format!("Unexpected end of input, {}", self.buffer))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn parse_tokens(mut tokens: impl Iterator<Item = Token>) -> Result<Command, String> {
    let Some(next) = tokens.next() else {
        return Err("Unexpected end of input".into());
    };
    let command = match next {
        Token::Keyword(keyword) => match keyword {
            Keyword::Get => Command::Get(GetCommand(parse_identifier(&mut tokens, "GET")?)),
            Keyword::Put => {
                let key = parse_identifier(&mut tokens, "PUT")?;
                Command::Put(PutCommand(key, parse_literal(&mut tokens)?))
            }
            Keyword::Update => {
                let key = parse_identifier(&mut tokens, "UPDATE")?;
                Command::Update(UpdateCommand(key, parse_literal(&mut tokens)?))
            }
            Keyword::Delete => {
                Command::Delete(DeleteCommand(parse_identifier(&mut tokens, "DELETE")?))
            }
            Keyword::List => Command::List,
            Keyword::Stats => Command::Stats,
            Keyword::Exit => Command::Exit,
        },
        _ => return Err("Expected keyword GET, PUT, UPDATE, DELETE, LIST, STATS or EXIT".into()),
    };
    if tokens.next().is_some() {
        return Err("Unexpected token at end of command".to_string());
    }
    Ok(command)
}

fn parse_identifier(
    tokens: &mut impl Iterator<Item = Token>,
    keyword: &str,
) -> Result<String, String> {
    match tokens.next() {
        Some(Token::Ident(ident)) => Ok(ident),
        _ => Err(format!("Expected identifier after {}", keyword)),
    }
}

fn parse_literal(tokens: &mut impl Iterator<Item = Token>) -> Result<String, String> {
    match tokens.next() {
        Some(Token::Literal(literal)) => Ok(literal),
        _ => Err("Expected literal after identifier".to_string()),
    }
}
