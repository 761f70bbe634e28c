//! Structural validation of token scripts.
//!
//! Checks section order, delimiter balance and the fixed arity of the
//! control forms. Everything that is not a control form is an opaque simple
//! statement, so new command tokens need no validator changes.

use super::lexer::{Spanned, Token, tokenize};
use crate::error::CompileError;

const EXPRESSION_OPS: [&str; 10] = ["=", "!=", ">", ">=", "<", "<=", "+", "-", "*", "/"];

pub fn validate_script(script: &str) -> Result<(), CompileError> {
    if script.is_empty() {
        return Err(CompileError::InvalidScript { reason: "Script is empty.".to_string() });
    }
    let tokens = tokenize(script)?;
    let mut parser = Parser::new(tokens, script.len());
    parser.parse_script()
}

fn is_expression_head(word: &str) -> bool {
    word.strip_prefix('O').is_some_and(|op| EXPRESSION_OPS.contains(&op))
}

/// `O*` in `DO*`, `PO+`, `BFO*`: a command whose operand is an expression.
fn embedded_expression(word: &str) -> Option<&str> {
    word.char_indices()
        .filter(|&(_, c)| c == 'O')
        .map(|(i, _)| &word[i..])
        .find(|tail| is_expression_head(tail))
}

struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    end: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>, end: usize) -> Self {
        Self { tokens, position: 0, end }
    }

    fn parse_script(&mut self) -> Result<(), CompileError> {
        self.expect_section("I")?;
        self.parse_items(|p| p.at_section("S"))?;
        self.expect_section("S")?;
        self.parse_items(|p| p.at_section("L"))?;
        self.expect_section("L")?;
        self.parse_items(|p| p.at_final_pipe())?;
        self.expect(Token::Pipe)?;
        if let Some(extra) = self.peek() {
            return Err(self.error_at(extra.span.start, "Unexpected content after the loop section"));
        }
        Ok(())
    }

    /// `|X|`
    fn expect_section(&mut self, marker: &str) -> Result<(), CompileError> {
        if !self.at_section(marker) {
            return Err(self.error("Script must contain ordered |I|, |S|, |L| sections."));
        }
        self.position += 3;
        Ok(())
    }

    fn at_section(&self, marker: &str) -> bool {
        matches!(self.lookahead(0), Some(Token::Pipe))
            && matches!(self.lookahead(1), Some(Token::Word(w)) if w == marker)
            && matches!(self.lookahead(2), Some(Token::Pipe))
    }

    fn at_final_pipe(&self) -> bool {
        matches!(self.lookahead(0), Some(Token::Pipe)) && self.lookahead(1).is_none()
    }

    /// Pipe-separated statements up to (not including) the terminator.
    fn parse_items(&mut self, at_end: fn(&Parser) -> bool) -> Result<(), CompileError> {
        if at_end(self) {
            return Ok(());
        }
        loop {
            self.parse_statement()?;
            if at_end(self) {
                return Ok(());
            }
            self.expect(Token::Pipe)?;
        }
    }

    fn parse_statement(&mut self) -> Result<(), CompileError> {
        let form = match (self.lookahead(0), self.lookahead(1)) {
            (Some(Token::Word(w)), Some(Token::LParen)) => match w.as_str() {
                "G" | "C" | "W" | "F" | "K" => Some(w.clone()),
                _ => None,
            },
            _ => None,
        };
        match form.as_deref() {
            Some("G") => self.parse_assignment(),
            Some("C") => self.parse_conditional(),
            Some("W") => self.parse_while(),
            Some("F") => self.parse_for(),
            Some("K") => self.parse_switch(),
            _ => self.parse_simple(),
        }
    }

    /// Bare tokens: `ERN`, `D200`, `D I1`, `BF440`, `P"hi"`, `R(P,1)`, `DO*,I1,100`.
    fn parse_simple(&mut self) -> Result<(), CompileError> {
        let mut consumed = 0;
        loop {
            let expression = match self.lookahead(0) {
                Some(Token::Word(w)) => embedded_expression(w).map(str::to_string),
                _ => None,
            };
            if let Some(head) = expression {
                let at = self.current_offset();
                self.position += 1;
                self.parse_expression_tail(at, &head)?;
                consumed += 1;
                continue;
            }
            match self.lookahead(0) {
                None | Some(Token::Pipe) | Some(Token::RBrace) => break,
                Some(Token::LBrace) => return Err(self.error("Unexpected '{' in statement")),
                Some(Token::RParen) => return Err(self.error("Unbalanced ')'")),
                Some(Token::Comma) => return Err(self.error("Unexpected ',' outside parentheses")),
                Some(Token::LParen) => self.parse_group()?,
                _ => {
                    self.position += 1;
                }
            }
            consumed += 1;
        }
        if consumed == 0 {
            return Err(self.error("Expected statement"));
        }
        Ok(())
    }

    /// Balanced `( ... )` with opaque content.
    fn parse_group(&mut self) -> Result<(), CompileError> {
        self.expect(Token::LParen)?;
        let mut depth = 1;
        while depth > 0 {
            match self.advance() {
                Some(Token::LParen) => depth += 1,
                Some(Token::RParen) => depth -= 1,
                Some(Token::LBrace) | Some(Token::RBrace) => {
                    return Err(self.error("Unbalanced delimiters inside parentheses"));
                }
                Some(_) => {}
                None => return Err(self.error("Unbalanced delimiters: missing closing bracket.")),
            }
        }
        Ok(())
    }

    /// `G(<type>,<slot>,<op>,<value>)`
    fn parse_assignment(&mut self) -> Result<(), CompileError> {
        let start = self.current_offset();
        self.position += 1;
        self.expect(Token::LParen)?;

        match self.advance() {
            Some(Token::Word(t)) if matches!(t.as_str(), "I" | "F" | "C" | "S" | "B") => {}
            other => {
                let found = format!("{:?}", other);
                return Err(self.error_at(start, &format!("Malformed G(...): invalid type {}", found)));
            }
        }
        self.expect_field_separator(start)?;
        match self.advance() {
            Some(Token::Word(slot)) if matches!(slot.as_str(), "1" | "2" | "3" | "4" | "5") => {}
            _ => return Err(self.error_at(start, "Malformed G(...): slot must be 1..5")),
        }
        self.expect_field_separator(start)?;
        match self.advance() {
            Some(Token::Word(op)) if op == "=" || op == "+" => {}
            _ => return Err(self.error_at(start, "Malformed G(...): operator must be = or +")),
        }
        self.expect_field_separator(start)?;
        self.parse_operand()?;
        if !matches!(self.lookahead(0), Some(Token::RParen)) {
            return Err(self.error_at(start, "Malformed G(...): expected 4 arguments."));
        }
        self.position += 1;
        Ok(())
    }

    fn expect_field_separator(&mut self, start: usize) -> Result<(), CompileError> {
        if matches!(self.advance(), Some(Token::Comma)) {
            Ok(())
        } else {
            Err(self.error_at(start, "Malformed G(...): expected 4 arguments."))
        }
    }

    /// `C(<expr>){<then>}{<else>}`
    fn parse_conditional(&mut self) -> Result<(), CompileError> {
        self.position += 1;
        self.parse_guard()?;
        self.parse_block()?;
        self.parse_block()
    }

    /// `W(<expr>){<body>}`
    fn parse_while(&mut self) -> Result<(), CompileError> {
        self.position += 1;
        self.parse_guard()?;
        self.parse_block()
    }

    /// `F(<start>-<end>,<step>){<body>}`
    fn parse_for(&mut self) -> Result<(), CompileError> {
        self.position += 1;
        self.expect(Token::LParen)?;
        match self.advance() {
            Some(Token::Word(range)) => {
                let valid = range
                    .char_indices()
                    .skip(1)
                    .any(|(i, c)| c == '-' && i + 1 < range.len());
                if !valid {
                    let message = format!("Malformed F(...): expected start-end range, found {}", range);
                    return Err(self.error(&message));
                }
            }
            _ => return Err(self.error("Malformed F(...): expected start-end range")),
        }
        self.expect(Token::Comma)?;
        self.parse_operand()?;
        self.expect(Token::RParen)?;
        self.parse_block()
    }

    /// `K(<value>, (<case>){<body>} ... (D){<default>})`
    fn parse_switch(&mut self) -> Result<(), CompileError> {
        self.position += 1;
        self.expect(Token::LParen)?;
        self.parse_operand()?;
        self.expect(Token::Comma)?;
        let mut cases = 0;
        while matches!(self.lookahead(0), Some(Token::LParen)) {
            self.position += 1;
            self.parse_operand()?;
            self.expect(Token::RParen)?;
            self.parse_block()?;
            cases += 1;
        }
        if cases == 0 {
            return Err(self.error("Malformed K(...): expected at least one case"));
        }
        self.expect(Token::RParen)
    }

    fn parse_guard(&mut self) -> Result<(), CompileError> {
        self.expect(Token::LParen)?;
        match self.lookahead(0) {
            Some(Token::Word(w)) if is_expression_head(w) => {}
            _ => return Err(self.error("Expected O<op> condition")),
        }
        self.parse_operand()?;
        self.expect(Token::RParen)
    }

    /// `O<op>,<operand>,<operand>` (prefix, nestable) or an atom.
    fn parse_operand(&mut self) -> Result<(), CompileError> {
        let at = self.current_offset();
        match self.advance() {
            Some(Token::Word(w)) if is_expression_head(&w) => self.parse_expression_tail(at, &w),
            Some(Token::Word(_)) => {
                // R(A), R(TE): reads with an argument list
                if matches!(self.lookahead(0), Some(Token::LParen)) {
                    self.parse_group()?;
                }
                Ok(())
            }
            Some(Token::Str(_)) | Some(Token::Char(_)) => Ok(()),
            _ => Err(self.error_at(at, "Expected operand")),
        }
    }

    /// `,<operand>,<operand>` after an `O<op>` head.
    fn parse_expression_tail(&mut self, at: usize, head: &str) -> Result<(), CompileError> {
        for _ in 0..2 {
            if !matches!(self.advance(), Some(Token::Comma)) {
                return Err(self.error_at(at, &format!("Malformed expression {}: expected 2 operands.", head)));
            }
            self.parse_operand()?;
        }
        Ok(())
    }

    /// `{}` or `{|a|b|}`
    fn parse_block(&mut self) -> Result<(), CompileError> {
        self.expect(Token::LBrace)?;
        if matches!(self.lookahead(0), Some(Token::RBrace)) {
            self.position += 1;
            return Ok(());
        }
        self.expect(Token::Pipe)?;
        loop {
            self.parse_statement()?;
            self.expect(Token::Pipe)?;
            if matches!(self.lookahead(0), Some(Token::RBrace)) {
                self.position += 1;
                return Ok(());
            }
        }
    }

    // Вспомогательные методы
    fn lookahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.position + n).map(|s| &s.token)
    }

    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).map(|s| s.token.clone());
        self.position += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), CompileError> {
        let at = self.current_offset();
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => {
                let message = format!("Expected {:?}, found {:?}", expected, token);
                Err(self.error_at(at, &message))
            }
            None => {
                let message = format!("Expected {:?}, but reached end of script", expected);
                Err(self.error_at(at, &message))
            }
        }
    }

    fn current_offset(&self) -> usize {
        self.peek().map(|s| s.span.start).unwrap_or(self.end)
    }

    fn error(&self, message: &str) -> CompileError {
        self.error_at(self.current_offset(), message)
    }

    fn error_at(&self, position: usize, message: &str) -> CompileError {
        CompileError::SyntaxError { position, message: message.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(script: &str) -> bool {
        validate_script(script).is_ok()
    }

    #[test]
    fn accepts_exporter_shapes() {
        assert!(valid("|I||S||L||"));
        assert!(valid("|I|E|S||L|ERN|D200|ERF|"));
        assert!(valid("|I|E|T|V|S||L|W(O=,TR,1){|C(O>,VR,10){|EGN|}{}|}|"));
        assert!(valid(r#"|I|E|R"EMMI"|S||L|C(O>,R(A),0){|G(C,1,=,R(R))|}{}|C(O=,C1,'E'){|ERN|D200|ERF|D200|}{}|"#));
        assert!(valid("|I|B|S|BF440|D500|BS|BPStarWars|L|D I1|"));
        assert!(valid("|I||S|G(I,1,=,O+,I1,1)|L|F(1-10,1){}|K(I1, (0){|X|} (D){})|"));
        assert!(valid("|I||S||L|C(O=,I1,1){|ERN|}{|C(O=,I1,2){|EGN|}{}|}|"));
        assert!(valid("|I||S||L|C(O*,O!=,I1,0,O!=,I1,1){}{}|"));
        assert!(valid(r#"|I||S|P"a|b{"|R(PE,"x")|L||"#));
    }

    #[test]
    fn rejects_misordered_sections() {
        assert!(!valid("|S|A|L|B|"));
        assert!(!valid("|I||L||S||"));
        assert!(!valid(""));
        assert!(!valid("|I||S||L|"));
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(!valid("|I||S|G(I,1,=)|L||"));
        assert!(!valid("|I||S|G(I,1,=,0,1)|L||"));
        assert!(!valid("|I||S|G(Q,1,=,0)|L||"));
        assert!(!valid("|I||S|G(I,6,=,0)|L||"));
        assert!(!valid("|I||S||L|C(O=,1){}{}|"));
        assert!(!valid("|I||S||L|C(O=,1,1){}|"));
        assert!(!valid("|I||S||L|F(5,1){}|"));
        assert!(!valid("|I||S||L|K(I1, )|"));
    }

    #[test]
    fn commands_with_expression_operands() {
        assert!(valid("|I||S||L|DO*,I1,100|"));
        assert!(valid("|I||S||L|PO+,I1,1|"));
        assert!(valid("|I|B|S||L|BFO*,F1,2|BS|"));
        assert!(valid("|I||S||L|PO>,I1,O+,I2,1|"));
        assert!(!valid("|I||S||L|DO*,I1|"));
        assert!(!valid("|I||S||L|DO*,I1,2,3|"));
    }

    #[test]
    fn rejects_unbalanced_delimiters() {
        assert!(!valid("|I||S||L|C(O=,1,1){|ERN|{}|"));
        assert!(!valid("|I||S||L|W(O=,1,1){|ERN|}}|"));
        assert!(!valid("|I||S||L|R(P,1|"));
    }

    #[test]
    fn reports_offset_of_problem() {
        match validate_script("|I||S|G(I,1,=)|L||") {
            Err(CompileError::SyntaxError { position, .. }) => assert_eq!(position, 6),
            other => panic!("unexpected {:?}", other),
        }
    }
}
