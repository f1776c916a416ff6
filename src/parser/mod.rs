pub mod ast;

use std::rc::Rc;

use crate::error::{Error, ErrorKind};
use crate::lexer::{Keyword, Span, Token, TokenKind};

use self::ast::{ElseCase, IfCase, Node, NodeKind, SwitchCase, UsingMember};

type Parsed<T = Node> = Result<T, Error>;

fn is_comp_op(kind: &TokenKind) -> bool {
    use TokenKind::*;
    matches!(kind, Lt | Lte | Ee | Ne | Gt | Gte)
}

fn is_term_op(kind: &TokenKind) -> bool {
    use TokenKind::*;
    matches!(kind, Plus | Minus | BitAnd | BitOr | BitXor | Shl | Shr)
}

fn is_calc_op(kind: &TokenKind) -> bool {
    use TokenKind::*;
    matches!(kind, Mul | Div | Floor | Mod | Arrow | Question | At)
}

fn is_power_op(kind: &TokenKind) -> bool {
    use TokenKind::*;
    matches!(kind, Pow | Double)
}

fn is_unary_op(kind: &TokenKind) -> bool {
    use TokenKind::*;
    matches!(kind, Plus | Minus | Not | Xat | Invert)
}

/// Recursive-descent parser with single-token lookahead. The token stream is
/// guaranteed (by the lexer) to end with an EOF token, which is never
/// consumed.
pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
    /// True inside any `function` body; `return` is only legal here.
    in_func: bool,
    /// True inside a `for`/`while` body; `break`/`continue` are only legal
    /// here. Entering a function body resets it.
    in_loop: bool,
    /// Where the trailing-statement backtrack in `program` gave up, so the
    /// top-level leftover-input diagnostic can point into the real failure.
    tail_error: Option<(usize, Error)>,
}

pub fn parse(tokens: Vec<Token>) -> Parsed {
    Parser::new(tokens).run()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(
            tokens.last().map(|token| &token.kind),
            Some(TokenKind::Eof)
        ));
        Self {
            tokens,
            index: 0,
            in_func: false,
            in_loop: false,
            tail_error: None,
        }
    }

    fn run(&mut self) -> Parsed {
        let program = self.program()?;
        if self.kind() != &TokenKind::Eof {
            if let Some((index, error)) = self.tail_error.take() {
                if index == self.index {
                    return Err(error);
                }
            }
            return Err(self.error(format!("unexpected {}", self.kind().describe())));
        }
        Ok(program)
    }

    fn current(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn span(&self) -> Span {
        self.current().span.clone()
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.index.saturating_sub(1)].span.clone()
    }

    fn advance(&mut self) {
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
    }

    fn error(&self, details: impl Into<String>) -> Error {
        Error::new(ErrorKind::InvalidSyntax, details, Some(self.span()))
    }

    fn matches(&self, keyword: Keyword) -> bool {
        self.current().matches(keyword)
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> Parsed<Span> {
        if !self.matches(keyword) {
            return Err(self.error(format!(
                "expected \"{}\"",
                TokenKind::Keyword(keyword).describe()
            )));
        }
        let span = self.span();
        self.advance();
        Ok(span)
    }

    fn eat(&mut self, kind: TokenKind) -> Parsed<Span> {
        if self.kind() != &kind {
            return Err(self.error(format!("expected \"{}\"", kind.describe())));
        }
        let span = self.span();
        self.advance();
        Ok(span)
    }

    fn identifier(&mut self) -> Parsed<(String, Span)> {
        let TokenKind::Identifier(name) = self.kind() else {
            return Err(self.error("expected an identifier"));
        };
        let name = name.clone();
        let span = self.span();
        self.advance();
        Ok((name, span))
    }

    /// Run `f`, restoring the cursor and the statement contexts when it
    /// fails. The caller decides what to do with the error.
    fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Parsed<T>) -> Parsed<T> {
        let index = self.index;
        let in_func = self.in_func;
        let in_loop = self.in_loop;
        f(self).map_err(|error| {
            self.index = index;
            self.in_func = in_func;
            self.in_loop = in_loop;
            error
        })
    }

    /// Consume a run of NEWLINE tokens.
    fn blanks(&mut self) -> usize {
        let mut count = 0;
        while self.kind() == &TokenKind::Newline {
            self.advance();
            count += 1;
        }
        count
    }

    /// program ::= blanks [stmt (blanks stmt)*] blanks
    ///
    /// Always yields a block list node. The trailing backtrack lets the
    /// enclosing construct (or `run`) deal with whatever did not parse.
    fn program(&mut self) -> Parsed {
        let start = self.span();
        let mut statements = vec![];

        self.blanks();
        if self.kind() == &TokenKind::Eof {
            return Ok(Node::new(
                NodeKind::List {
                    items: statements,
                    is_block: true,
                },
                start.to(&self.span()),
            ));
        }

        statements.push(self.stmt()?);
        loop {
            if self.blanks() == 0 {
                break;
            }
            match self.attempt(Self::stmt) {
                Ok(statement) => statements.push(statement),
                Err(error) => {
                    self.tail_error = Some((self.index, error));
                    break;
                }
            }
        }

        Ok(Node::new(
            NodeKind::List {
                items: statements,
                is_block: true,
            },
            start.to(&self.span()),
        ))
    }

    /// stmt ::= PASS | return-expr | continue | break | expr
    fn stmt(&mut self) -> Parsed {
        let start = self.span();

        if self.matches(Keyword::Pass) {
            self.advance();
            return Ok(Node::new(NodeKind::Null, start));
        }

        if self.matches(Keyword::Return) {
            if !self.in_func {
                return Err(Error::new(
                    ErrorKind::Outside,
                    "\"return\" outside function",
                    Some(start),
                ));
            }
            self.advance();
            let value = self.attempt(Self::expr).ok();
            let span = start.to(&self.prev_span());
            return Ok(Node::new(
                NodeKind::Return {
                    value: value.map(Box::new),
                },
                span,
            ));
        }

        if self.matches(Keyword::Continue) {
            if !self.in_loop {
                return Err(Error::new(
                    ErrorKind::Outside,
                    "\"continue\" outside loop",
                    Some(start),
                ));
            }
            self.advance();
            return Ok(Node::new(NodeKind::Continue, start));
        }

        if self.matches(Keyword::Break) {
            if !self.in_loop {
                return Err(Error::new(
                    ErrorKind::Outside,
                    "\"break\" outside loop",
                    Some(start),
                ));
            }
            self.advance();
            return Ok(Node::new(NodeKind::Break, start));
        }

        self.expr()
    }

    /// The keyword-dispatched statement-expressions, else the binary ladder
    /// topped by short-circuit `and`/`or`.
    fn expr(&mut self) -> Parsed {
        if let TokenKind::Keyword(keyword) = self.kind() {
            use Keyword::*;
            match keyword {
                Var => return self.var_expr(),
                If => return self.if_expr(),
                For => return self.for_expr(),
                While => return self.while_expr(),
                Exit => return self.exit_expr(),
                Throw => return self.throw_expr(),
                Function => return self.func_expr(),
                Lambda => return self.lambda_expr(),
                Include => return self.include_expr(),
                Try => return self.try_expr(),
                Delete => return self.delete_expr(),
                Assert => return self.assert_expr(),
                Switch => return self.switch_expr(),
                Attr => return self.attr_expr(),
                Namespace => return self.namespace_expr(),
                Using => return self.using_expr(),
                _ => {}
            }
        }

        let mut left = self.comp_expr()?;
        loop {
            let is_and = self.matches(Keyword::And);
            if !is_and && !self.matches(Keyword::Or) {
                break;
            }
            self.advance();
            let right = self.comp_expr()?;
            let span = left.span.to(&right.span);
            let kind = if is_and {
                NodeKind::And {
                    left: Box::new(left),
                    right: Box::new(right),
                }
            } else {
                NodeKind::Or {
                    left: Box::new(left),
                    right: Box::new(right),
                }
            };
            left = Node::new(kind, span);
        }
        Ok(left)
    }

    fn bin_op(
        &mut self,
        ops: fn(&TokenKind) -> bool,
        next: fn(&mut Self) -> Parsed,
    ) -> Parsed {
        let mut left = next(self)?;
        while ops(self.kind()) {
            let op = self.kind().clone();
            self.advance();
            let right = next(self)?;
            let span = left.span.to(&right.span);
            left = Node::new(
                NodeKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    /// comp-expr ::= term-expr ((LT | LTE | EE | NE | GT | GTE) term-expr)*
    fn comp_expr(&mut self) -> Parsed {
        self.bin_op(is_comp_op, Self::term_expr)
    }

    /// term-expr ::= calc-expr ((PLUS | MINUS | AND | OR | XOR | SHL | SHR) calc-expr)*
    fn term_expr(&mut self) -> Parsed {
        self.bin_op(is_term_op, Self::calc_expr)
    }

    /// calc-expr ::= power-expr ((MUL | DIV | FLOOR | MOD | ARROW | QUESTION | AT) power-expr)*
    fn calc_expr(&mut self) -> Parsed {
        self.bin_op(is_calc_op, Self::power_expr)
    }

    /// power-expr ::= postfix-expr ((POW | DOUBLE) postfix-expr)*
    fn power_expr(&mut self) -> Parsed {
        self.bin_op(is_power_op, Self::postfix_expr)
    }

    /// After any atom, greedily consume `.ident`, `(args)` and `[expr]`.
    fn postfix_expr(&mut self) -> Parsed {
        let mut node = self.factor()?;
        loop {
            match self.kind() {
                TokenKind::Point => {
                    self.advance();
                    let (name, name_span) = self.identifier()?;
                    let span = node.span.to(&name_span);
                    node = Node::new(
                        NodeKind::AttrAccess {
                            target: Box::new(node),
                            name,
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let mut args = vec![];
                    if self.kind() != &TokenKind::RParen {
                        args.push(self.expr()?);
                        while self.kind() == &TokenKind::Comma {
                            self.advance();
                            args.push(self.expr()?);
                        }
                    }
                    let end = self.eat(TokenKind::RParen)?;
                    let span = node.span.to(&end);
                    node = Node::new(
                        NodeKind::Call {
                            callee: Box::new(node),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expr()?;
                    let end = self.eat(TokenKind::RBracket)?;
                    let span = node.span.to(&end);
                    node = Node::new(
                        NodeKind::Index {
                            target: Box::new(node),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn factor(&mut self) -> Parsed {
        let span = self.span();
        let kind = self.kind().clone();
        match kind {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Node::new(NodeKind::Int(value), span))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Node::new(NodeKind::Float(value), span))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Node::new(NodeKind::Str(value), span))
            }
            TokenKind::Bool(value) => {
                self.advance();
                Ok(Node::new(NodeKind::Bool(value), span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Node::new(NodeKind::Null, span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Node::new(NodeKind::VarAccess { name }, span))
            }
            op if is_unary_op(&op) || op == TokenKind::Keyword(Keyword::Not) => {
                let op = if op == TokenKind::Keyword(Keyword::Not) {
                    TokenKind::Not
                } else {
                    op
                };
                self.advance();
                let operand = self.factor()?;
                let full = span.to(&operand.span);
                Ok(Node::new(
                    NodeKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    full,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let node = self.expr()?;
                self.eat(TokenKind::RParen)?;
                Ok(node)
            }
            TokenKind::LBracket => self.list_expr(),
            TokenKind::LBrace => self.dict_expr(),
            _ => Err(self.error("invalid token")),
        }
    }

    /// var-expr ::= VAR identifier [aug-op] EQ expr
    fn var_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Var)?;
        let (name, name_span) = self.identifier()?;

        let op = if self.kind().is_augmented_op() {
            let op = self.kind().clone();
            self.advance();
            Some(op)
        } else {
            None
        };
        self.eat(TokenKind::Assign)?;

        let mut value = self.expr()?;
        if let Some(op) = op {
            let access = Node::new(
                NodeKind::VarAccess { name: name.clone() },
                name_span.clone(),
            );
            let span = name_span.to(&value.span);
            value = Node::new(
                NodeKind::Binary {
                    left: Box::new(access),
                    op,
                    right: Box::new(value),
                },
                span,
            );
        }

        let span = start.to(&value.span);
        Ok(Node::new(
            NodeKind::VarAssign {
                name,
                value: Box::new(value),
            },
            span,
        ))
    }

    /// if-expr ::= IF expr THEN stmt [{ELIF expr THEN stmt}] [ELSE stmt]
    ///           | IF expr THEN NEWLINE program [{ELIF ...}] [ELSE NEWLINE program] END
    fn if_expr(&mut self) -> Parsed {
        let start = self.span();
        let (cases, else_case) = self.if_cases(Keyword::If)?;
        let span = start.to(&self.prev_span());
        Ok(Node::new(
            NodeKind::If {
                cases,
                else_case: else_case.map(Box::new),
            },
            span,
        ))
    }

    fn if_cases(&mut self, keyword: Keyword) -> Parsed<(Vec<IfCase>, Option<ElseCase>)> {
        self.eat_keyword(keyword)?;
        let condition = self.expr()?;
        self.eat_keyword(Keyword::Then)?;

        let mut cases = vec![];
        if self.kind() == &TokenKind::Newline {
            self.advance();
            let body = self.program()?;
            cases.push(IfCase {
                condition,
                body,
                is_block: true,
            });

            if self.matches(Keyword::End) {
                self.advance();
                return Ok((cases, None));
            }
            if !self.matches(Keyword::Elif) && !self.matches(Keyword::Else) {
                return Err(self.error("expected \"elif\", \"else\" or \"end\""));
            }
        } else {
            let body = self.stmt()?;
            cases.push(IfCase {
                condition,
                body,
                is_block: false,
            });
        }

        if self.matches(Keyword::Elif) {
            let (more, else_case) = self.if_cases(Keyword::Elif)?;
            cases.extend(more);
            return Ok((cases, else_case));
        }
        let else_case = self.if_else()?;
        Ok((cases, else_case))
    }

    fn if_else(&mut self) -> Parsed<Option<ElseCase>> {
        if !self.matches(Keyword::Else) {
            return Ok(None);
        }
        self.advance();

        if self.kind() == &TokenKind::Newline {
            self.advance();
            let body = self.program()?;
            self.eat_keyword(Keyword::End)?;
            return Ok(Some(ElseCase {
                body,
                is_block: true,
            }));
        }
        let body = self.stmt()?;
        Ok(Some(ElseCase {
            body,
            is_block: false,
        }))
    }

    /// The shared `then`-tail of `for` and `while`:
    /// a single statement, or NEWLINE program [ELSE program] END.
    fn loop_body(&mut self) -> Parsed<(Node, bool, Option<Node>)> {
        if self.kind() != &TokenKind::Newline {
            let body = self.stmt()?;
            return Ok((body, false, None));
        }
        self.advance();

        let body = self.program()?;
        let mut else_body = None;
        if self.matches(Keyword::Else) {
            self.advance();
            else_body = Some(self.program()?);
        }
        if !self.matches(Keyword::End) {
            let details = if else_body.is_some() {
                "expected \"end\""
            } else {
                "expected \"end\" or \"else\""
            };
            return Err(self.error(details));
        }
        self.advance();
        Ok((body, true, else_body))
    }

    /// for-expr ::= FOR identifier [EQ expr] TO expr [STEP expr] THEN body
    fn for_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::For)?;
        let (var, _) = self.identifier()?;

        let mut start_value = None;
        if self.kind() == &TokenKind::Assign {
            self.advance();
            start_value = Some(self.expr()?);
        }
        self.eat_keyword(Keyword::To)?;
        let end_value = self.expr()?;
        let mut step_value = None;
        if self.matches(Keyword::Step) {
            self.advance();
            step_value = Some(self.expr()?);
        }
        self.eat_keyword(Keyword::Then)?;

        let saved = self.in_loop;
        self.in_loop = true;
        let body = self.loop_body();
        self.in_loop = saved;
        let (body, is_block, else_body) = body?;

        let span = start.to(&self.prev_span());
        Ok(Node::new(
            NodeKind::For {
                var,
                start: start_value.map(Box::new),
                end: Box::new(end_value),
                step: step_value.map(Box::new),
                body: Box::new(body),
                is_block,
                else_body: else_body.map(Box::new),
            },
            span,
        ))
    }

    /// while-expr ::= WHILE expr THEN body
    fn while_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::While)?;
        let condition = self.expr()?;
        self.eat_keyword(Keyword::Then)?;

        let saved = self.in_loop;
        self.in_loop = true;
        let body = self.loop_body();
        self.in_loop = saved;
        let (body, is_block, else_body) = body?;

        let span = start.to(&self.prev_span());
        Ok(Node::new(
            NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
                is_block,
                else_body: else_body.map(Box::new),
            },
            span,
        ))
    }

    fn exit_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Exit)?;
        let status = self.attempt(Self::expr).ok();
        let span = start.to(&self.prev_span());
        Ok(Node::new(
            NodeKind::Exit {
                status: status.map(Box::new),
            },
            span,
        ))
    }

    /// throw-expr ::= THROW [expr COMMA expr]
    fn throw_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Throw)?;
        let Ok(name) = self.attempt(Self::expr) else {
            return Ok(Node::new(
                NodeKind::Throw {
                    name: None,
                    details: None,
                },
                start.to(&self.prev_span()),
            ));
        };
        self.eat(TokenKind::Comma)?;
        let details = self.expr()?;
        let span = start.to(&details.span);
        Ok(Node::new(
            NodeKind::Throw {
                name: Some(Box::new(name)),
                details: Some(Box::new(details)),
            },
            span,
        ))
    }

    /// func-expr ::= FUNCTION identifier LPAREN [args] RPAREN
    ///               (DO expr | NEWLINE program END)
    fn func_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Function)?;
        let (name, _) = self.identifier()?;
        let args = self.arg_names()?;

        let saved_func = self.in_func;
        let saved_loop = self.in_loop;
        self.in_func = true;
        self.in_loop = false;
        let body = self.function_body();
        self.in_func = saved_func;
        self.in_loop = saved_loop;
        let (body, auto_return) = body?;

        let span = start.to(&self.prev_span());
        Ok(Node::new(
            NodeKind::Function {
                name: Some(name),
                args,
                body: Rc::new(body),
                auto_return,
            },
            span,
        ))
    }

    fn arg_names(&mut self) -> Parsed<Vec<String>> {
        self.eat(TokenKind::LParen)?;
        let mut args = vec![];
        if matches!(self.kind(), TokenKind::Identifier(_)) {
            args.push(self.identifier()?.0);
            while self.kind() == &TokenKind::Comma {
                self.advance();
                args.push(self.identifier()?.0);
            }
        }
        self.eat(TokenKind::RParen)?;
        Ok(args)
    }

    fn function_body(&mut self) -> Parsed<(Node, bool)> {
        if self.matches(Keyword::Do) {
            self.advance();
            return Ok((self.expr()?, true));
        }
        if self.kind() != &TokenKind::Newline {
            return Err(self.error("expected \"do\" or a new line"));
        }
        self.advance();
        let body = self.program()?;
        self.eat_keyword(Keyword::End)?;
        Ok((body, false))
    }

    /// lambda-expr ::= LAMBDA [identifier (COMMA identifier)*] DO expr
    fn lambda_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Lambda)?;

        let mut args = vec![];
        if !self.matches(Keyword::Do) {
            args.push(self.identifier()?.0);
            while self.kind() == &TokenKind::Comma {
                self.advance();
                args.push(self.identifier()?.0);
            }
        }
        self.eat_keyword(Keyword::Do)?;
        let body = self.expr()?;

        let span = start.to(&body.span);
        Ok(Node::new(
            NodeKind::Function {
                name: None,
                args,
                body: Rc::new(body),
                auto_return: true,
            },
            span,
        ))
    }

    fn include_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Include)?;
        let module = self.expr()?;
        let span = start.to(&module.span);
        Ok(Node::new(
            NodeKind::Include {
                module: Box::new(module),
            },
            span,
        ))
    }

    /// try-expr ::= TRY THEN body CATCH identifier COMMA identifier THEN body
    ///              [ELSE program] [FINALLY program] [END]
    fn try_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Try)?;
        self.eat_keyword(Keyword::Then)?;

        let mut is_block = true;
        let body = if self.kind() == &TokenKind::Newline {
            self.advance();
            self.program()?
        } else {
            is_block = false;
            self.stmt()?
        };

        self.eat_keyword(Keyword::Catch)?;
        let (catch_name, _) = self.identifier()?;
        self.eat(TokenKind::Comma)?;
        let (catch_details, _) = self.identifier()?;
        self.eat_keyword(Keyword::Then)?;

        let mut else_body = None;
        let mut finally_body = None;
        let catch_body = if self.kind() == &TokenKind::Newline {
            self.advance();
            let catch_body = self.program()?;
            if self.matches(Keyword::Else) {
                self.advance();
                else_body = Some(self.program()?);
            }
            if self.matches(Keyword::Finally) {
                self.advance();
                finally_body = Some(self.program()?);
            }
            self.eat_keyword(Keyword::End)?;
            catch_body
        } else {
            is_block = false;
            self.stmt()?
        };

        let span = start.to(&self.prev_span());
        Ok(Node::new(
            NodeKind::Try {
                body: Box::new(body),
                catch_name,
                catch_details,
                catch_body: Box::new(catch_body),
                is_block,
                else_body: else_body.map(Box::new),
                finally_body: finally_body.map(Box::new),
            },
            span,
        ))
    }

    /// del-expr ::= DELETE identifier
    fn delete_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Delete)?;
        let (name, name_span) = self.identifier()?;
        Ok(Node::new(NodeKind::Delete { name }, start.to(&name_span)))
    }

    /// assert-expr ::= ASSERT expr [COMMA expr]
    fn assert_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Assert)?;
        let condition = self.expr()?;
        let mut details = None;
        if self.kind() == &TokenKind::Comma {
            self.advance();
            details = Some(self.expr()?);
        }
        let span = start.to(&self.prev_span());
        Ok(Node::new(
            NodeKind::Assert {
                condition: Box::new(condition),
                details: details.map(Box::new),
            },
            span,
        ))
    }

    /// switch-expr ::= SWITCH expr [NEWLINE] case+ [DEFAULT body] END
    /// where case ::= CASE expr [UNLESS expr] THEN body.
    /// Without the newline the bodies are single expressions and the whole
    /// construct yields the matched value; with it the bodies are programs
    /// and the construct yields null.
    fn switch_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Switch)?;
        let condition = self.expr()?;

        let mut auto_return = true;
        if self.kind() == &TokenKind::Newline {
            self.blanks();
            auto_return = false;
        }

        let mut cases = vec![self.switch_case(auto_return)?];
        while self.matches(Keyword::Case) {
            cases.push(self.switch_case(auto_return)?);
        }

        let mut default = None;
        if self.matches(Keyword::Default) {
            self.advance();
            default = Some(self.switch_body(auto_return)?);
        }
        self.eat_keyword(Keyword::End)?;

        let span = start.to(&self.prev_span());
        Ok(Node::new(
            NodeKind::Switch {
                condition: Box::new(condition),
                cases,
                default: default.map(Box::new),
                auto_return,
            },
            span,
        ))
    }

    fn switch_case(&mut self, auto_return: bool) -> Parsed<SwitchCase> {
        self.eat_keyword(Keyword::Case)?;
        let matches = self.expr()?;
        let mut guard = None;
        if self.matches(Keyword::Unless) {
            self.advance();
            guard = Some(self.expr()?);
        }
        self.eat_keyword(Keyword::Then)?;
        let body = self.switch_body(auto_return)?;
        Ok(SwitchCase {
            matches,
            body,
            guard,
        })
    }

    fn switch_body(&mut self, auto_return: bool) -> Parsed {
        if auto_return {
            self.expr()
        } else {
            self.program()
        }
    }

    /// set-expr ::= ATTR identifier POINT identifier [aug-op] EQ expr
    fn attr_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Attr)?;
        let (receiver, receiver_span) = self.identifier()?;
        self.eat(TokenKind::Point)?;
        let (attr, attr_span) = self.identifier()?;

        let op = if self.kind().is_augmented_op() {
            let op = self.kind().clone();
            self.advance();
            Some(op)
        } else {
            None
        };
        self.eat(TokenKind::Assign)?;

        let mut value = self.expr()?;
        if let Some(op) = op {
            let access = Node::new(
                NodeKind::AttrAccess {
                    target: Box::new(Node::new(
                        NodeKind::VarAccess {
                            name: receiver.clone(),
                        },
                        receiver_span.clone(),
                    )),
                    name: attr.clone(),
                },
                receiver_span.to(&attr_span),
            );
            let span = receiver_span.to(&value.span);
            value = Node::new(
                NodeKind::Binary {
                    left: Box::new(access),
                    op,
                    right: Box::new(value),
                },
                span,
            );
        }

        let span = start.to(&value.span);
        Ok(Node::new(
            NodeKind::AttrAssign {
                receiver,
                attr,
                value: Box::new(value),
            },
            span,
        ))
    }

    /// namespace-expr ::= NAMESPACE identifier program END
    fn namespace_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Namespace)?;
        let (name, _) = self.identifier()?;
        let body = self.program()?;
        let end = self.eat_keyword(Keyword::End)?;
        Ok(Node::new(
            NodeKind::Namespace {
                name,
                body: Box::new(body),
            },
            start.to(&end),
        ))
    }

    /// using-expr ::= USING identifier POINT (identifier | MUL)
    fn using_expr(&mut self) -> Parsed {
        let start = self.eat_keyword(Keyword::Using)?;
        let (namespace, _) = self.identifier()?;
        self.eat(TokenKind::Point)?;

        let member = match self.kind() {
            TokenKind::Identifier(name) => UsingMember::Name(name.clone()),
            TokenKind::Mul => UsingMember::All,
            _ => return Err(self.error("expected an identifier or \"*\"")),
        };
        let end = self.span();
        self.advance();

        Ok(Node::new(
            NodeKind::Using { namespace, member },
            start.to(&end),
        ))
    }

    /// list-expr ::= LBRACKET blanks [expr (COMMA blanks expr)*] blanks RBRACKET
    fn list_expr(&mut self) -> Parsed {
        let start = self.eat(TokenKind::LBracket)?;
        self.blanks();

        let mut items = vec![];
        if self.kind() != &TokenKind::RBracket {
            items.push(self.expr()?);
            while self.kind() == &TokenKind::Comma {
                self.advance();
                self.blanks();
                items.push(self.expr()?);
            }
            self.blanks();
        }
        let end = self.eat(TokenKind::RBracket)?;

        Ok(Node::new(
            NodeKind::List {
                items,
                is_block: false,
            },
            start.to(&end),
        ))
    }

    /// dict-expr ::= LBRACE blanks [pair (COMMA blanks pair)*] blanks RBRACE
    /// where pair ::= expr COLON blanks expr.
    fn dict_expr(&mut self) -> Parsed {
        let start = self.eat(TokenKind::LBrace)?;
        self.blanks();

        let mut items = vec![];
        if self.kind() != &TokenKind::RBrace {
            items.push(self.dict_pair()?);
            while self.kind() == &TokenKind::Comma {
                self.advance();
                self.blanks();
                items.push(self.dict_pair()?);
            }
            self.blanks();
        }
        let end = self.eat(TokenKind::RBrace)?;

        Ok(Node::new(NodeKind::Dict { items }, start.to(&end)))
    }

    fn dict_pair(&mut self) -> Parsed<(Node, Node)> {
        let key = self.expr()?;
        self.eat(TokenKind::Colon)?;
        self.blanks();
        let value = self.expr()?;
        Ok((key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_source(input: &str) -> Parsed {
        parse(Lexer::new("<test>", input).lex().expect("should lex"))
    }

    fn statements(input: &str) -> Vec<Node> {
        let program = parse_source(input).expect("should parse");
        let NodeKind::List { items, .. } = program.kind else {
            unreachable!()
        };
        items
    }

    fn node(kind: NodeKind) -> Node {
        Node::new(kind, Span::default())
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            vec![node(NodeKind::Binary {
                left: Box::new(node(NodeKind::Int(1))),
                op: TokenKind::Plus,
                right: Box::new(node(NodeKind::Binary {
                    left: Box::new(node(NodeKind::Int(2))),
                    op: TokenKind::Mul,
                    right: Box::new(node(NodeKind::Int(3))),
                })),
            })],
            statements("1 + 2 * 3")
        );
    }

    #[test]
    fn test_comparison_binds_loosest() {
        assert_eq!(
            vec![node(NodeKind::Binary {
                left: Box::new(node(NodeKind::Int(1))),
                op: TokenKind::Lt,
                right: Box::new(node(NodeKind::Binary {
                    left: Box::new(node(NodeKind::Int(2))),
                    op: TokenKind::Plus,
                    right: Box::new(node(NodeKind::Int(3))),
                })),
            })],
            statements("1 < 2 + 3")
        );
    }

    #[test]
    fn test_and_or_are_dedicated_nodes() {
        assert_eq!(
            vec![node(NodeKind::Or {
                left: Box::new(node(NodeKind::And {
                    left: Box::new(node(NodeKind::Bool(true))),
                    right: Box::new(node(NodeKind::Bool(false))),
                })),
                right: Box::new(node(NodeKind::Bool(true))),
            })],
            statements("true and false or true")
        );
    }

    #[test]
    fn test_var_assignment() {
        assert_eq!(
            vec![node(NodeKind::VarAssign {
                name: "x".into(),
                value: Box::new(node(NodeKind::Int(42))),
            })],
            statements("var x = 42")
        );
    }

    #[test]
    fn test_compound_assignment_desugars() {
        assert_eq!(
            vec![node(NodeKind::VarAssign {
                name: "x".into(),
                value: Box::new(node(NodeKind::Binary {
                    left: Box::new(node(NodeKind::VarAccess { name: "x".into() })),
                    op: TokenKind::Plus,
                    right: Box::new(node(NodeKind::Int(1))),
                })),
            })],
            statements("var x += 1")
        );
    }

    #[test]
    fn test_postfix_chain() {
        assert_eq!(
            vec![node(NodeKind::Call {
                callee: Box::new(node(NodeKind::AttrAccess {
                    target: Box::new(node(NodeKind::Index {
                        target: Box::new(node(NodeKind::VarAccess { name: "a".into() })),
                        index: Box::new(node(NodeKind::Int(0))),
                    })),
                    name: "b".into(),
                })),
                args: vec![node(NodeKind::Int(1))],
            })],
            statements("a[0].b(1)")
        );
    }

    #[test]
    fn test_statement_form_if() {
        let NodeKind::If { cases, else_case } = statements("if x then 1 else 2")[0].kind.clone()
        else {
            panic!("expected an if node");
        };
        assert_eq!(1, cases.len());
        assert!(!cases[0].is_block);
        assert!(!else_case.expect("should have an else case").is_block);
    }

    #[test]
    fn test_block_form_if() {
        let NodeKind::If { cases, .. } =
            statements("if x then\n1\nelif y then\n2\nelse\n3\nend")[0]
                .kind
                .clone()
        else {
            panic!("expected an if node");
        };
        assert_eq!(2, cases.len());
        assert!(cases.iter().all(|case| case.is_block));
    }

    #[test]
    fn test_for_with_start_and_step() {
        let NodeKind::For {
            var, start, step, ..
        } = statements("for i = 1 to 10 step 2 then var x = i")[0]
            .kind
            .clone()
        else {
            panic!("expected a for node");
        };
        assert_eq!("i", var);
        assert!(start.is_some());
        assert!(step.is_some());
    }

    #[test]
    fn test_return_outside_function() {
        let error = parse_source("return 1").unwrap_err();
        assert_eq!(ErrorKind::Outside, error.kind);
        assert_eq!("\"return\" outside function", error.details);
    }

    #[test]
    fn test_break_outside_loop() {
        let error = parse_source("break").unwrap_err();
        assert_eq!(ErrorKind::Outside, error.kind);
    }

    #[test]
    fn test_return_inside_loop_inside_function() {
        assert!(parse_source("function f()\nwhile true then return 1\nend").is_ok());
    }

    #[test]
    fn test_break_inside_function_body_is_outside() {
        let error = parse_source("while true then function f()\nbreak\nend").unwrap_err();
        assert_eq!(ErrorKind::Outside, error.kind);
    }

    #[test]
    fn test_do_function_is_auto_return() {
        let NodeKind::Function {
            name, auto_return, ..
        } = statements("function inc(n) do n + 1")[0].kind.clone()
        else {
            panic!("expected a function node");
        };
        assert_eq!(Some("inc".into()), name);
        assert!(auto_return);
    }

    #[test]
    fn test_lambda() {
        let NodeKind::Function {
            name,
            args,
            auto_return,
            ..
        } = statements("lambda a, b do a + b")[0].kind.clone()
        else {
            panic!("expected a function node");
        };
        assert_eq!(None, name);
        assert_eq!(vec!["a".to_string(), "b".to_string()], args);
        assert!(auto_return);
    }

    #[test]
    fn test_multiline_list_and_dict() {
        assert_eq!(
            vec![node(NodeKind::VarAssign {
                name: "x".into(),
                value: Box::new(node(NodeKind::Dict {
                    items: vec![(
                        node(NodeKind::Str("k".into())),
                        node(NodeKind::List {
                            items: vec![node(NodeKind::Int(1)), node(NodeKind::Int(2))],
                            is_block: false,
                        }),
                    )],
                })),
            })],
            statements("var x = {\n\"k\": [1,\n2]\n}")
        );
    }

    #[test]
    fn test_leftover_input_is_an_error() {
        let error = parse_source("var x = 1\n)").unwrap_err();
        assert_eq!(ErrorKind::InvalidSyntax, error.kind);
    }

    #[test]
    fn test_switch_forms() {
        let NodeKind::Switch {
            auto_return, cases, ..
        } = statements("switch x case 1 then \"a\" case 2 unless y then \"b\" default \"c\" end")
            [0]
        .kind
        .clone()
        else {
            panic!("expected a switch node");
        };
        assert!(auto_return);
        assert_eq!(2, cases.len());
        assert!(cases[1].guard.is_some());
    }

    #[test]
    fn test_throw_forms() {
        assert_eq!(
            vec![
                node(NodeKind::Throw {
                    name: None,
                    details: None
                }),
                node(NodeKind::Throw {
                    name: Some(Box::new(node(NodeKind::Str("MathError".into())))),
                    details: Some(Box::new(node(NodeKind::Str("oops".into())))),
                })
            ],
            statements("throw\nthrow \"MathError\", \"oops\"")
        );
    }

    #[test]
    fn test_membership_and_arrow() {
        assert_eq!(
            vec![node(NodeKind::Binary {
                left: Box::new(node(NodeKind::Int(1))),
                op: TokenKind::Double,
                right: Box::new(node(NodeKind::VarAccess { name: "xs".into() })),
            })],
            statements("1 :: xs")
        );
        assert_eq!(
            vec![node(NodeKind::Binary {
                left: Box::new(node(NodeKind::VarAccess { name: "xs".into() })),
                op: TokenKind::Arrow,
                right: Box::new(node(NodeKind::Int(0))),
            })],
            statements("xs -> 0")
        );
    }

    #[test]
    fn test_parse_ends_at_eof() {
        let mut parser = Parser::new(Lexer::new("<test>", "1 + 1").lex().expect("should lex"));
        parser.run().expect("should parse");
        assert_eq!(&TokenKind::Eof, parser.kind());
    }
}
