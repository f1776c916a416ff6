mod position;
mod token;

pub use position::*;
pub use token::*;

use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::error::{Error, ErrorKind};

/// First char of an operator mapped to its base kind plus the follow-chars
/// that extend it. The lexer reads the first char, then at most one matching
/// follow-char.
static OPERATORS: Lazy<HashMap<char, (TokenKind, Vec<(char, TokenKind)>)>> = Lazy::new(|| {
    use TokenKind::*;
    HashMap::from([
        ('+', (Plus, vec![])),
        ('-', (Minus, vec![('>', Arrow)])),
        ('*', (Mul, vec![('*', Pow), ('@', Xat)])),
        ('/', (Div, vec![('/', Floor)])),
        ('&', (BitAnd, vec![])),
        ('|', (BitOr, vec![])),
        ('!', (Not, vec![('=', Ne)])),
        ('=', (Assign, vec![('=', Ee)])),
        ('<', (Lt, vec![('=', Lte), ('<', Shl), ('>', Ne)])),
        ('>', (Gt, vec![('=', Gte), ('>', Shr)])),
        ('%', (Mod, vec![])),
        ('?', (Question, vec![])),
        (':', (Colon, vec![(':', Double)])),
        ('(', (LParen, vec![])),
        (')', (RParen, vec![])),
        ('{', (LBrace, vec![])),
        ('}', (RBrace, vec![])),
        (',', (Comma, vec![])),
        ('[', (LBracket, vec![])),
        (']', (RBracket, vec![])),
        ('^', (BitXor, vec![])),
        ('~', (Invert, vec![])),
        ('@', (At, vec![])),
    ])
});

fn escape_char(c: char) -> char {
    match c {
        'n' => '\n',
        'r' => '\r',
        'a' => '\u{7}',
        'b' => '\u{8}',
        't' => '\t',
        'f' => '\u{c}',
        'v' => '\u{b}',
        '0' => '\0',
        other => other,
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub struct Lexer {
    source: Rc<Source>,
    position: Position,
    current: Option<char>,
    /// Combined depth of `()`, `[]` and `{}`. While inside any of them,
    /// newlines and `;` do not produce NEWLINE tokens.
    paren_depth: usize,
    /// Textual macro table consulted before keyword classification.
    defines: HashMap<String, String>,
}

impl Lexer {
    pub fn new(file: impl Into<String>, text: impl Into<String>) -> Self {
        let source = Source::new(file, text);
        let current = source.text.chars().next();

        Self {
            source,
            position: Position::default(),
            current,
            paren_depth: 0,
            defines: HashMap::new(),
        }
    }

    /// Register a textual replacement for an identifier.
    pub fn define(&mut self, name: impl Into<String>, replacement: impl Into<String>) {
        self.defines.insert(name.into(), replacement.into());
    }

    fn advance(&mut self) {
        self.position.advance(self.current);
        self.current = self.source.text[self.position.index.min(self.source.text.len())..]
            .chars()
            .next();
    }

    fn span_from(&self, start: Position) -> Span {
        Span::new(Rc::clone(&self.source), start, self.position)
    }

    pub fn lex(mut self) -> Result<Vec<Token>, Error> {
        let mut tokens = vec![];

        while let Some(current) = self.current {
            if current == '#' {
                self.skip_comment();
                continue;
            }

            if current == ' ' || current == '\t' {
                self.advance();
                continue;
            }

            // A backslash right before a line break continues the line.
            if current == '\\' {
                self.advance();
                if matches!(self.current, Some('\n' | ';')) {
                    self.advance();
                }
                continue;
            }

            if current == '\n' || current == ';' {
                if self.paren_depth == 0 {
                    tokens.push(Token::new(
                        TokenKind::Newline,
                        Span::at(Rc::clone(&self.source), self.position),
                    ));
                }
                self.advance();
                continue;
            }

            if current.is_ascii_digit() || current == '.' {
                tokens.push(self.lex_number());
                continue;
            }

            if is_identifier_start(current) {
                tokens.push(self.lex_identifier());
                continue;
            }

            if let Some((base, extensions)) = OPERATORS.get(&current) {
                match current {
                    '(' | '[' | '{' => self.paren_depth += 1,
                    ')' | ']' | '}' => self.paren_depth = self.paren_depth.saturating_sub(1),
                    _ => {}
                }
                tokens.push(self.lex_operator(base.clone(), extensions));
                continue;
            }

            if current == '"' || current == '\'' || current == '`' {
                tokens.push(self.lex_string(current)?);
                continue;
            }

            let start = self.position;
            self.advance();
            return Err(Error::new(
                ErrorKind::IllegalCharacter,
                format!("\"{current}\""),
                Some(self.span_from(start)),
            ));
        }

        tokens.push(Token::new(
            TokenKind::Eof,
            Span::at(Rc::clone(&self.source), self.position),
        ));
        Ok(tokens)
    }

    fn skip_comment(&mut self) {
        self.advance();
        while self.current.is_some() && self.current != Some('\n') {
            self.advance();
        }
    }

    /// A digit-or-dot run with embedded `_` ignored; at most one `.`. A bare
    /// `.` is the POINT separator, not a number.
    fn lex_number(&mut self) -> Token {
        let start = self.position;
        let mut num = String::new();
        let mut dots = 0;

        while let Some(current) = self.current {
            if !current.is_ascii_digit() && current != '.' && current != '_' {
                break;
            }
            if current == '.' {
                dots += 1;
                if dots > 1 {
                    break;
                }
            }
            if current == '_' {
                self.advance();
                continue;
            }
            num.push(current);
            self.advance();
        }

        let kind = if dots > 0 {
            if num == "." {
                TokenKind::Point
            } else {
                TokenKind::Float(num.parse().unwrap_or(f64::NAN))
            }
        } else {
            match num.parse::<i64>() {
                Ok(value) => TokenKind::Int(value),
                // Out of integer range; carry on with the float value.
                Err(_) => TokenKind::Float(num.parse().unwrap_or(f64::INFINITY)),
            }
        };

        Token::new(kind, self.span_from(start))
    }

    fn lex_identifier(&mut self) -> Token {
        let start = self.position;
        let mut name = String::new();

        while let Some(current) = self.current {
            if !is_identifier_part(current) {
                break;
            }
            name.push(current);
            self.advance();
        }

        if let Some(replacement) = self.defines.get(&name) {
            name = replacement.clone();
        }

        let kind = match name.as_str() {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            "null" => TokenKind::Null,
            _ => match Keyword::from_name(&name) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Identifier(name),
            },
        };

        Token::new(kind, self.span_from(start))
    }

    fn lex_operator(&mut self, base: TokenKind, extensions: &[(char, TokenKind)]) -> Token {
        let start = self.position;
        let mut kind = base;

        self.advance();
        for (expectation, extended) in extensions {
            if self.current == Some(*expectation) {
                self.advance();
                kind = extended.clone();
                break;
            }
        }

        Token::new(kind, self.span_from(start))
    }

    /// `"` and `'` interpret backslash escapes; backtick strings are raw.
    fn lex_string(&mut self, quotation: char) -> Result<Token, Error> {
        let start = self.position;
        let mut string = String::new();
        let mut escaped = false;

        self.advance();
        while self.current != Some(quotation) || escaped {
            let Some(current) = self.current else {
                return Err(self.unterminated(quotation, start));
            };
            if current == '\n' {
                return Err(self.unterminated(quotation, start));
            }

            if escaped {
                string.push(escape_char(current));
                escaped = false;
                self.advance();
                continue;
            }
            if current == '\\' && quotation != '`' {
                escaped = true;
                self.advance();
                continue;
            }

            string.push(current);
            self.advance();
        }

        self.advance();
        Ok(Token::new(TokenKind::Str(string), self.span_from(start)))
    }

    fn unterminated(&self, quotation: char, start: Position) -> Error {
        let details = if quotation == '"' {
            "expected '\"'".to_string()
        } else {
            format!("expected \"{quotation}\"")
        };
        Error::new(
            ErrorKind::InvalidSyntax,
            details,
            Some(self.span_from(start)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new("<test>", input).lex().expect("should lex")
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input).into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn test_lex_identifier() {
        assert_eq!(
            vec![
                TokenKind::Identifier("letter".into()),
                TokenKind::Identifier("$tmp_1".into()),
                TokenKind::Eof
            ],
            kinds("letter $tmp_1")
        );
    }

    #[test]
    fn test_lex_keywords_and_literals() {
        assert_eq!(
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Identifier("foo".into()),
                TokenKind::Assign,
                TokenKind::Bool(true),
                TokenKind::Eof
            ],
            kinds("var foo = true")
        );
    }

    #[test]
    fn test_lex_numbers() {
        assert_eq!(
            vec![
                TokenKind::Int(1337),
                TokenKind::Float(13.37),
                TokenKind::Int(1000000),
                TokenKind::Eof
            ],
            kinds("1337 13.37 1_000_000")
        );
    }

    #[test]
    fn test_bare_dot_is_point() {
        assert_eq!(
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Point,
                TokenKind::Identifier("b".into()),
                TokenKind::Eof
            ],
            kinds("a.b")
        );
    }

    #[test]
    fn test_lex_operator_lookahead() {
        assert_eq!(
            vec![
                TokenKind::Arrow,
                TokenKind::Pow,
                TokenKind::Xat,
                TokenKind::Double,
                TokenKind::Ne,
                TokenKind::Shl,
                TokenKind::Lte,
                TokenKind::Minus,
                TokenKind::Gt,
                TokenKind::Eof
            ],
            kinds("-> ** *@ :: <> << <= - >")
        );
    }

    #[test]
    fn test_newline_suppressed_in_brackets() {
        assert_eq!(
            vec![
                TokenKind::LBracket,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::LParen,
                TokenKind::Int(2),
                TokenKind::RParen,
                TokenKind::RBracket,
                TokenKind::Newline,
                TokenKind::Eof
            ],
            kinds("[1,\n(2\n)]\n")
        );
    }

    #[test]
    fn test_semicolon_is_newline() {
        assert_eq!(
            vec![
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Int(2),
                TokenKind::Eof
            ],
            kinds("1; 2")
        );
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(
            vec![TokenKind::Int(1), TokenKind::Plus, TokenKind::Int(2), TokenKind::Eof],
            kinds("1 + \\\n2")
        );
    }

    #[test]
    fn test_comment_runs_to_end_of_line() {
        assert_eq!(
            vec![TokenKind::Int(1), TokenKind::Newline, TokenKind::Int(2), TokenKind::Eof],
            kinds("1 # comment ###\n2")
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            vec![
                TokenKind::Str("a\nb\tc\0d?e".into()),
                TokenKind::Str("raw\\n".into()),
                TokenKind::Eof
            ],
            kinds(r#""a\nb\tc\0d\?e" `raw\n`"#)
        );
    }

    #[test]
    fn test_unterminated_string() {
        let error = Lexer::new("<test>", "\"oops\nvar").lex().unwrap_err();
        assert_eq!(ErrorKind::InvalidSyntax, error.kind);
    }

    #[test]
    fn test_illegal_character() {
        let error = Lexer::new("<test>", "var \u{1f980}").lex().unwrap_err();
        assert_eq!(ErrorKind::IllegalCharacter, error.kind);
    }

    #[test]
    fn test_defines_are_rescanned() {
        let mut lexer = Lexer::new("<test>", "forever x");
        lexer.define("forever", "while");
        let tokens = lexer.lex().expect("should lex");

        assert_eq!(
            vec![
                TokenKind::Keyword(Keyword::While),
                TokenKind::Identifier("x".into()),
                TokenKind::Eof
            ],
            tokens.into_iter().map(|token| token.kind).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_token_spans_roundtrip() {
        let tokens = lex("var foo = 41 + 1.5");
        for token in &tokens {
            match &token.kind {
                TokenKind::Eof => continue,
                TokenKind::Int(value) => assert_eq!(value.to_string(), token.span.lexeme()),
                TokenKind::Float(value) => assert_eq!(value.to_string(), token.span.lexeme()),
                _ => assert!(!token.span.lexeme().is_empty()),
            }
        }
    }
}
