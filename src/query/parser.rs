//! Recursive-descent parser producing [`ParsedStatement`]s.

use crate::errors::DocGraphError;
use crate::graph_index::Direction;
use crate::record::TypeKind;
use crate::value::Value;

use super::ast::{
    AggregateFn, CompareOp, Condition, Expr, Join, OrderKey, ParsedStatement, Projection,
    ProjectionItem, SelectQuery, Source, Statement, Traversal,
};
use super::lexer::{Token, TokenKind, tokenize};

/// Words that end a source clause instead of naming an alias.
const RESERVED: &[&str] = &[
    "WHERE", "JOIN", "INNER", "ON", "GROUP", "ORDER", "LIMIT", "AS", "SET",
];

/// Clause words that can never be a type name. `Order` and `Group` stay usable.
const NOT_A_TYPE: &[&str] = &["WHERE", "JOIN", "INNER", "ON", "LIMIT", "AS", "SET"];

pub fn parse(input: &str) -> Result<ParsedStatement, DocGraphError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        params: 0,
    };
    let statement = parser.statement()?;
    parser.eat(&TokenKind::Semicolon);
    if parser.peek().kind != TokenKind::Eof {
        return Err(parser.error("expected end of statement"));
    }
    Ok(ParsedStatement {
        statement,
        param_count: parser.params,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    params: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check_kw(&self, keyword: &str) -> bool {
        self.peek().is_keyword(keyword)
    }

    fn eat_kw(&mut self, keyword: &str) -> bool {
        if self.check_kw(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, keyword: &str) -> Result<(), DocGraphError> {
        if self.eat_kw(keyword) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {keyword}")))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), DocGraphError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, DocGraphError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(&format!("expected {what}"))),
        }
    }

    fn error(&self, message: &str) -> DocGraphError {
        let token = self.peek();
        DocGraphError::syntax(
            token.position,
            format!("{message}, found {}", describe(&token.kind)),
        )
    }

    fn statement(&mut self) -> Result<Statement, DocGraphError> {
        if self.check_kw("SELECT") {
            self.select().map(Statement::Select)
        } else if self.check_kw("CREATE") {
            self.create_type()
        } else if self.check_kw("UPDATE") {
            self.update()
        } else if self.check_kw("DELETE") {
            self.delete()
        } else {
            Err(self.error("expected SELECT, CREATE, UPDATE or DELETE"))
        }
    }

    fn select(&mut self) -> Result<SelectQuery, DocGraphError> {
        self.expect_kw("SELECT")?;
        let projection = if self.check_kw("FROM") || self.eat(&TokenKind::Star) {
            Projection::All
        } else if self.check_kw("expand") && self.peek_at(1).kind == TokenKind::LParen {
            self.pos += 2;
            let traversal = self.traversal()?;
            self.expect(&TokenKind::RParen, "')' after expand")?;
            Projection::Expand(traversal)
        } else {
            Projection::Items(self.projection_items()?)
        };

        self.expect_kw("FROM")?;
        let from = self.source()?;

        let join = if self.eat_kw("INNER") || self.check_kw("JOIN") {
            self.expect_kw("JOIN")?;
            let source = self.source()?;
            self.expect_kw("ON")?;
            let left = self.expr()?;
            self.expect(&TokenKind::Eq, "'=' in join condition")?;
            let right = self.expr()?;
            Some(Join {
                source,
                left,
                right,
            })
        } else {
            None
        };

        let filter = if self.eat_kw("WHERE") {
            Some(self.condition()?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.eat_kw("GROUP") {
            self.expect_kw("BY")?;
            loop {
                group_by.push(self.expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let mut order_by = Vec::new();
        if self.eat_kw("ORDER") {
            self.expect_kw("BY")?;
            loop {
                let expr = self.expr()?;
                let descending = if self.eat_kw("DESC") {
                    true
                } else {
                    self.eat_kw("ASC");
                    false
                };
                order_by.push(OrderKey { expr, descending });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let limit = if self.eat_kw("LIMIT") {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(SelectQuery {
            projection,
            from,
            join,
            filter,
            group_by,
            order_by,
            limit,
        })
    }

    fn traversal(&mut self) -> Result<Traversal, DocGraphError> {
        let name = self.ident("out, in or both")?;
        let direction = match name.to_ascii_lowercase().as_str() {
            "out" => Direction::Out,
            "in" => Direction::In,
            "both" => Direction::Both,
            _ => {
                return Err(DocGraphError::syntax(
                    self.tokens[self.pos - 1].position,
                    format!("unknown traversal {name}, expected out, in or both"),
                ));
            }
        };
        self.expect(&TokenKind::LParen, "'(' after traversal")?;
        let mut edge_types = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                match self.advance().kind {
                    TokenKind::Str(name) | TokenKind::Ident(name) => edge_types.push(name),
                    _ => {
                        self.pos -= 1;
                        return Err(self.error("expected edge type name"));
                    }
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "')' after edge types")?;
        }
        Ok(Traversal {
            direction,
            edge_types,
        })
    }

    fn projection_items(&mut self) -> Result<Vec<ProjectionItem>, DocGraphError> {
        let mut items = Vec::new();
        loop {
            if self.check_kw("expand") && self.peek_at(1).kind == TokenKind::LParen {
                return Err(self.error("expand() must be the only projection"));
            }
            items.push(self.projection_item()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn projection_item(&mut self) -> Result<ProjectionItem, DocGraphError> {
        let aggregate = match &self.peek().kind {
            TokenKind::Ident(name) if self.peek_at(1).kind == TokenKind::LParen => {
                AggregateFn::from_name(name)
            }
            _ => None,
        };
        if let Some(func) = aggregate {
            self.pos += 2;
            let arg = if func == AggregateFn::Count && self.eat(&TokenKind::Star) {
                None
            } else {
                Some(self.expr()?)
            };
            self.expect(&TokenKind::RParen, "')' after aggregate argument")?;
            let alias = self.alias()?;
            return Ok(ProjectionItem::Aggregate { func, arg, alias });
        }
        let expr = self.expr()?;
        let alias = self.alias()?;
        Ok(ProjectionItem::Expr { expr, alias })
    }

    fn alias(&mut self) -> Result<Option<String>, DocGraphError> {
        if self.eat_kw("AS") {
            self.ident("alias after AS").map(Some)
        } else {
            Ok(None)
        }
    }

    fn source(&mut self) -> Result<Source, DocGraphError> {
        if NOT_A_TYPE.iter().any(|kw| self.check_kw(kw)) {
            return Err(self.error("expected type name"));
        }
        let type_name = self.ident("type name")?;
        let alias = if self.eat_kw("AS") {
            Some(self.ident("alias after AS")?)
        } else {
            match &self.peek().kind {
                TokenKind::Ident(name)
                    if !RESERVED.iter().any(|kw| name.eq_ignore_ascii_case(kw)) =>
                {
                    let name = name.clone();
                    self.pos += 1;
                    Some(name)
                }
                _ => None,
            }
        };
        Ok(Source { type_name, alias })
    }

    fn condition(&mut self) -> Result<Condition, DocGraphError> {
        let mut left = self.and_condition()?;
        while self.eat_kw("OR") {
            let right = self.and_condition()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_condition(&mut self) -> Result<Condition, DocGraphError> {
        let mut left = self.not_condition()?;
        while self.eat_kw("AND") {
            let right = self.not_condition()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_condition(&mut self) -> Result<Condition, DocGraphError> {
        if self.eat_kw("NOT") {
            return Ok(Condition::Not(Box::new(self.not_condition()?)));
        }
        if self.peek().kind == TokenKind::LParen {
            // Either a grouped condition or a parenthesised operand; try the former first.
            let (saved_pos, saved_params) = (self.pos, self.params);
            self.pos += 1;
            if let Ok(inner) = self.condition() {
                if self.eat(&TokenKind::RParen) && !self.at_operator() {
                    return Ok(inner);
                }
            }
            self.pos = saved_pos;
            self.params = saved_params;
        }
        self.comparison()
    }

    fn at_operator(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Eq
                | TokenKind::Ne
                | TokenKind::Lt
                | TokenKind::Le
                | TokenKind::Gt
                | TokenKind::Ge
                | TokenKind::Concat
        ) || self.check_kw("IS")
    }

    fn comparison(&mut self) -> Result<Condition, DocGraphError> {
        let left = self.expr()?;
        if self.eat_kw("IS") {
            let negated = self.eat_kw("NOT");
            self.expect_kw("NULL")?;
            return Ok(Condition::IsNull {
                expr: left,
                negated,
            });
        }
        let op = match self.peek().kind {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Ne => CompareOp::Ne,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Ge => CompareOp::Ge,
            _ => return Err(self.error("expected comparison operator")),
        };
        self.pos += 1;
        let right = self.expr()?;
        Ok(Condition::Compare { left, op, right })
    }

    fn expr(&mut self) -> Result<Expr, DocGraphError> {
        let mut left = self.primary()?;
        while self.eat(&TokenKind::Concat) {
            let right = self.primary()?;
            left = Expr::Concat(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, DocGraphError> {
        let token = self.advance();
        let expr = match token.kind {
            TokenKind::Str(s) => Expr::Literal(Value::String(s)),
            TokenKind::Int(i) => Expr::Literal(Value::Int(i)),
            TokenKind::Float(f) => Expr::Literal(Value::Float(f)),
            TokenKind::Minus => match self.advance().kind {
                TokenKind::Int(i) => Expr::Literal(Value::Int(-i)),
                TokenKind::Float(f) => Expr::Literal(Value::Float(-f)),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected number after '-'"));
                }
            },
            TokenKind::Param => {
                let index = self.params;
                self.params += 1;
                Expr::Param(index)
            }
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                inner
            }
            TokenKind::LBrace => self.map_literal()?,
            TokenKind::LBracket => self.list_literal()?,
            TokenKind::Ident(name) => {
                if name.eq_ignore_ascii_case("true") {
                    Expr::Literal(Value::Bool(true))
                } else if name.eq_ignore_ascii_case("false") {
                    Expr::Literal(Value::Bool(false))
                } else if name.eq_ignore_ascii_case("null") {
                    Expr::Literal(Value::Null)
                } else {
                    let mut path = vec![name];
                    while self.eat(&TokenKind::Dot) {
                        path.push(self.ident("field name after '.'")?);
                    }
                    Expr::Field(path)
                }
            }
            TokenKind::Eof => return Err(self.error("expected expression")),
            _ => {
                self.pos -= 1;
                return Err(self.error("expected expression"));
            }
        };
        Ok(expr)
    }

    fn map_literal(&mut self) -> Result<Expr, DocGraphError> {
        let mut entries = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::Map(entries));
        }
        loop {
            let key = match self.advance().kind {
                TokenKind::Str(key) | TokenKind::Ident(key) => key,
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected map key"));
                }
            };
            self.expect(&TokenKind::Colon, "':' after map key")?;
            entries.push((key, self.expr()?));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Expr::Map(entries))
    }

    fn list_literal(&mut self) -> Result<Expr, DocGraphError> {
        let mut items = Vec::new();
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expr::List(items));
        }
        loop {
            items.push(self.expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(Expr::List(items))
    }

    fn create_type(&mut self) -> Result<Statement, DocGraphError> {
        self.expect_kw("CREATE")?;
        let kind = if self.eat_kw("DOCUMENT") {
            TypeKind::Document
        } else if self.eat_kw("VERTEX") {
            TypeKind::Vertex
        } else if self.eat_kw("EDGE") {
            TypeKind::Edge
        } else {
            return Err(self.error("expected DOCUMENT, VERTEX or EDGE"));
        };
        self.expect_kw("TYPE")?;
        let name = self.ident("type name")?;
        let if_not_exists = if self.eat_kw("IF") {
            self.expect_kw("NOT")?;
            self.expect_kw("EXISTS")?;
            true
        } else {
            false
        };
        Ok(Statement::CreateType {
            name,
            kind,
            if_not_exists,
        })
    }

    fn update(&mut self) -> Result<Statement, DocGraphError> {
        self.expect_kw("UPDATE")?;
        let type_name = self.ident("type name")?;
        self.expect_kw("SET")?;
        let mut assignments = Vec::new();
        loop {
            let field = self.ident("field name")?;
            self.expect(&TokenKind::Eq, "'=' in assignment")?;
            assignments.push((field, self.expr()?));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let filter = if self.eat_kw("WHERE") {
            Some(self.condition()?)
        } else {
            None
        };
        Ok(Statement::Update {
            type_name,
            assignments,
            filter,
        })
    }

    fn delete(&mut self) -> Result<Statement, DocGraphError> {
        self.expect_kw("DELETE")?;
        self.expect_kw("FROM")?;
        let type_name = self.ident("type name")?;
        let filter = if self.eat_kw("WHERE") {
            Some(self.condition()?)
        } else {
            None
        };
        Ok(Statement::Delete { type_name, filter })
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("'{name}'"),
        TokenKind::Str(s) => format!("string '{s}'"),
        TokenKind::Int(i) => i.to_string(),
        TokenKind::Float(f) => f.to_string(),
        TokenKind::Eof => "end of input".to_string(),
        other => format!("{other:?}"),
    }
}
