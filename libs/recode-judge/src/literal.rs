//! Parser and comparison for printed data literals.
//!
//! Programs often print values such as `[1, 2]`, `(3,)`, `{'a': 1}` or
//! `0.30000000000000004`. Parsing both sides lets the grader compare values
//! instead of text: floats within a tolerance, sets and dicts in any order.
//!
//! **Accepted forms:** integers, floats (with exponent), quoted strings with
//! the usual escapes, `True`/`False`/`None`, lists, tuples (including `(x,)`
//! and bare `a, b` at top level), sets and dicts. Nesting deeper than
//! `MAX_NESTING` is not a literal.

/// Deepest container nesting the parser will follow
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i128),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Set(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

/// Parse `input` as a single literal; trailing garbage makes it fail
pub fn parse_literal(input: &str) -> Option<Literal> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.top_level()?;
    parser.skip_ws();
    if parser.pos == parser.chars.len() {
        Some(value)
    } else {
        None
    }
}

/// Structural equality with a float tolerance.
///
/// Ints and floats compare numerically, bools never equal numbers, lists and
/// tuples compare in order, and sets and dicts ignore order.
pub fn literals_equal(a: &Literal, b: &Literal, eps: f64) -> bool {
    use Literal::*;

    match (a, b) {
        (Int(x), Int(y)) => x == y,
        (Float(x), Float(y)) => floats_close(*x, *y, eps),
        (Int(x), Float(y)) | (Float(y), Int(x)) => floats_close(*x as f64, *y, eps),
        (Bool(x), Bool(y)) => x == y,
        (Str(x), Str(y)) => x == y,
        (None, None) => true,
        (List(xs), List(ys)) | (Tuple(xs), Tuple(ys)) => {
            xs.len() == ys.len()
                && xs.iter().zip(ys).all(|(x, y)| literals_equal(x, y, eps))
        }
        (Set(xs), Set(ys)) => unordered_equal(xs, ys, |x, y| literals_equal(x, y, eps)),
        (Dict(xs), Dict(ys)) => unordered_equal(xs, ys, |(kx, vx), (ky, vy)| {
            literals_equal(kx, ky, eps) && literals_equal(vx, vy, eps)
        }),
        _ => false,
    }
}

fn floats_close(a: f64, b: f64, eps: f64) -> bool {
    if a.is_infinite() || b.is_infinite() || a.is_nan() || b.is_nan() {
        return a == b;
    }
    let diff = (a - b).abs();
    if diff <= eps {
        return true;
    }
    // Relative tolerance for magnitudes above one
    a.abs() > 1.0 && diff / a.abs() <= eps
}

/// Every element of `xs` pairs with a distinct element of `ys`
fn unordered_equal<T, F>(xs: &[T], ys: &[T], eq: F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    if xs.len() != ys.len() {
        return false;
    }
    let mut used = vec![false; ys.len()];
    xs.iter().all(|x| {
        match ys
            .iter()
            .enumerate()
            .position(|(i, y)| !used[i] && eq(x, y))
        {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// A value, or a bare comma-separated tuple
    fn top_level(&mut self) -> Option<Literal> {
        let first = self.value()?;
        if !self.eat(',') {
            return Some(first);
        }
        let mut items = vec![first];
        self.skip_ws();
        while self.peek().is_some() {
            items.push(self.value()?);
            if !self.eat(',') {
                break;
            }
            self.skip_ws();
        }
        Some(Literal::Tuple(items))
    }

    fn value(&mut self) -> Option<Literal> {
        self.skip_ws();
        match self.peek()? {
            open @ ('[' | '(' | '{') => {
                if self.depth >= MAX_NESTING {
                    return None;
                }
                self.pos += 1;
                self.depth += 1;
                let parsed = match open {
                    '[' => self.sequence(']').map(Literal::List),
                    '(' => self.parenthesized(),
                    _ => self.braced(),
                };
                self.depth -= 1;
                parsed
            }
            '\'' | '"' => self.string(),
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            c if c.is_alphabetic() => self.keyword(),
            _ => None,
        }
    }

    /// Comma-separated values up to `close`, allowing a trailing comma
    fn sequence(&mut self, close: char) -> Option<Vec<Literal>> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Some(items);
            }
            items.push(self.value()?);
            if !self.eat(',') {
                return self.eat(close).then_some(items);
            }
        }
    }

    fn parenthesized(&mut self) -> Option<Literal> {
        if self.eat(')') {
            return Some(Literal::Tuple(Vec::new()));
        }
        let first = self.value()?;
        if self.eat(')') {
            // `(x)` is just x
            return Some(first);
        }
        if !self.eat(',') {
            return None;
        }
        let mut items = vec![first];
        items.extend(self.sequence(')')?);
        Some(Literal::Tuple(items))
    }

    fn braced(&mut self) -> Option<Literal> {
        if self.eat('}') {
            return Some(Literal::Dict(Vec::new()));
        }
        let first = self.value()?;
        if !self.eat(':') {
            let mut items = vec![first];
            if self.eat(',') {
                items.extend(self.sequence('}')?);
            } else if !self.eat('}') {
                return None;
            }
            return Some(Literal::Set(items));
        }

        let mut entries = vec![(first, self.value()?)];
        loop {
            if self.eat('}') {
                return Some(Literal::Dict(entries));
            }
            if !self.eat(',') {
                return None;
            }
            if self.eat('}') {
                return Some(Literal::Dict(entries));
            }
            let key = self.value()?;
            if !self.eat(':') {
                return None;
            }
            entries.push((key, self.value()?));
        }
    }

    fn string(&mut self) -> Option<Literal> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => return Some(Literal::Str(out)),
                '\\' => {
                    let escaped = match self.bump()? {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    };
                    out.push(escaped);
                }
                c => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Option<Literal> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    if matches!(self.chars.get(self.pos + 1), Some('-') | Some('+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
            self.pos += 1;
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if is_float {
            return text.parse::<f64>().ok().map(Literal::Float);
        }
        match text.parse::<i128>() {
            Ok(n) => Some(Literal::Int(n)),
            // Too wide for i128: compare as a float
            Err(_) => text.parse::<f64>().ok().map(Literal::Float),
        }
    }

    fn keyword(&mut self) -> Option<Literal> {
        let start = self.pos;
        while self.peek().map_or(false, |c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" => Some(Literal::Bool(true)),
            "False" => Some(Literal::Bool(false)),
            "None" => Some(Literal::None),
            _ => None,
        }
    }
}
