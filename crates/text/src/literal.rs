//! 宽松的列表字面量解析
//!
//! 接受语言模型不按 JSON 输出时常见的列表写法：单引号或双引号字符串、
//! 尾随逗号、`True/False/None`、裸数字和嵌套列表。
//! 其他任何内容都会让整个解析失败。

/// 解析出的列表元素
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    /// 数字，保留原始写法
    Num(String),
    /// 布尔值、空值和嵌套列表
    Other,
}

/// 将 `input` 解析为一个列表字面量，两侧允许空白
pub fn parse_list(input: &str) -> Option<Vec<Literal>> {
    let mut parser = LiteralParser {
        chars: input.chars().collect(),
        pos: 0,
    };
    parser.skip_ws();
    let items = parser.list()?;
    parser.skip_ws();
    if parser.pos == parser.chars.len() {
        Some(items)
    } else {
        None
    }
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn list(&mut self) -> Option<Vec<Literal>> {
        if !self.eat('[') {
            return None;
        }
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(']') {
                return Some(items);
            }
            items.push(self.value()?);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            self.skip_ws();
            return if self.eat(']') { Some(items) } else { None };
        }
    }

    fn value(&mut self) -> Option<Literal> {
        match self.peek()? {
            '\'' | '"' => self.string().map(Literal::Str),
            '[' => self.list().map(|_| Literal::Other),
            c if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() => self.keyword(),
            _ => None,
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => break,
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'u' => {
                        let hex: String = (0..4).filter_map(|_| self.bump()).collect();
                        let code = u32::from_str_radix(&hex, 16).ok()?;
                        out.push(char::from_u32(code)?);
                    }
                    other => out.push(other),
                },
                c => out.push(c),
            }
        }

        // 相邻字面量会拼接：'Acme ' 'Inc'
        self.skip_ws();
        if matches!(self.peek(), Some('\'') | Some('"')) {
            out.push_str(&self.string()?);
        }
        Some(out)
    }

    fn number(&mut self) -> Option<Literal> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_'))
        {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let cleaned = raw.replace('_', "");
        if cleaned.parse::<f64>().is_ok() {
            Some(Literal::Num(cleaned))
        } else {
            None
        }
    }

    fn keyword(&mut self) -> Option<Literal> {
        let start = self.pos;
        while self.peek().is_some_and(char::is_alphanumeric) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "False" | "None" | "true" | "false" | "null" => Some(Literal::Other),
            _ => None,
        }
    }
}
