// ============================================================================
// cinder - Template Parser
// Restricted HTML parser for template statics
// ============================================================================
//
// Parses the sentinel-joined static string into a prototype node tree.
// The grammar is the subset templates actually use: elements, attributes
// (quoted, unquoted, bare), text, comments, void and self-closing elements.
// Malformed input fails loudly with RuntimeError::Parse - a silently skipped
// slot would produce a corrupted tree.
//
// Sentinel handling: every marker character in text becomes its own text
// node containing exactly the marker, so the binder can address each slot
// directly. Attribute values equal to the marker stay in place.
// ============================================================================

use crate::dom::node::{is_void_element, Node};
use crate::error::{Result, RuntimeError};
use crate::template::compile::MARKER;

/// Parse a template source string into a fragment node.
pub fn parse(input: &str) -> Result<Node> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };
    let fragment = Node::fragment();
    parser.parse_children(&fragment, None)?;
    if parser.pos < parser.chars.len() {
        return Err(RuntimeError::Parse(format!(
            "unexpected closing tag at offset {}",
            parser.pos
        )));
    }
    Ok(fragment)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Parse child nodes into `parent` until end of input or the matching
    /// closing tag for `parent_tag`.
    fn parse_children(&mut self, parent: &Node, parent_tag: Option<&str>) -> Result<()> {
        loop {
            if self.peek().is_none() {
                return match parent_tag {
                    Some(tag) => Err(RuntimeError::Parse(format!("unclosed element <{}>", tag))),
                    None => Ok(()),
                };
            }

            if self.starts_with("</") {
                let Some(tag) = parent_tag else {
                    // Caller (parse) reports the stray closing tag
                    return Ok(());
                };
                self.pos += 2;
                let name = self.read_name();
                self.skip_whitespace();
                if !self.eat(">") {
                    return Err(RuntimeError::Parse(format!(
                        "malformed closing tag </{}",
                        name
                    )));
                }
                if name != tag {
                    return Err(RuntimeError::Parse(format!(
                        "mismatched closing tag: expected </{}>, found </{}>",
                        tag, name
                    )));
                }
                return Ok(());
            }

            if self.starts_with("<!--") {
                self.pos += 4;
                let mut content = String::new();
                while !self.starts_with("-->") {
                    match self.bump() {
                        Some(c) => content.push(c),
                        None => {
                            return Err(RuntimeError::Parse("unterminated comment".to_string()))
                        }
                    }
                }
                self.pos += 3;
                parent.append_child(&Node::comment(content));
                continue;
            }

            if self.peek() == Some('<') {
                self.parse_element(parent)?;
                continue;
            }

            self.parse_text(parent);
        }
    }

    fn parse_element(&mut self, parent: &Node) -> Result<()> {
        self.pos += 1; // '<'
        let tag = self.read_name();
        if tag.is_empty() {
            return Err(RuntimeError::Parse(format!(
                "expected tag name at offset {}",
                self.pos
            )));
        }

        let element = Node::element(tag.clone());

        // Attributes
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => {
                    return Err(RuntimeError::Parse(format!("unclosed start tag <{}", tag)));
                }
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                Some('/') if self.starts_with("/>") => {
                    self.pos += 2;
                    parent.append_child(&element);
                    return Ok(());
                }
                _ => {
                    let name = self.read_attr_name();
                    if name.is_empty() {
                        return Err(RuntimeError::Parse(format!(
                            "malformed attribute in <{}>",
                            tag
                        )));
                    }
                    self.skip_whitespace();
                    let value = if self.eat("=") {
                        self.skip_whitespace();
                        self.read_attr_value()?
                    } else {
                        String::new() // bare attribute
                    };
                    element.set_attribute(name, value);
                }
            }
        }

        parent.append_child(&element);

        if !is_void_element(&tag) {
            self.parse_children(&element, Some(&tag))?;
        }
        Ok(())
    }

    fn parse_text(&mut self, parent: &Node) {
        let mut buf = String::new();
        while let Some(c) = self.peek() {
            if c == '<' {
                break;
            }
            self.pos += 1;
            if c == MARKER {
                if !buf.is_empty() {
                    parent.append_child(&Node::text(decode_entities(&buf)));
                    buf.clear();
                }
                // One marker per text node so the binder addresses it directly
                parent.append_child(&Node::text(MARKER.to_string()));
            } else {
                buf.push(c);
            }
        }
        if !buf.is_empty() {
            parent.append_child(&Node::text(decode_entities(&buf)));
        }
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        name
    }

    fn read_attr_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '=' || c == '>' || c == '/' {
                break;
            }
            name.push(c);
            self.pos += 1;
        }
        name
    }

    fn read_attr_value(&mut self) -> Result<String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => break,
                        Some(c) => value.push(c),
                        None => {
                            return Err(RuntimeError::Parse(
                                "unterminated attribute value".to_string(),
                            ))
                        }
                    }
                }
                Ok(decode_entities(&value))
            }
            _ => {
                // Unquoted value (including a bare sentinel after `key=`)
                let mut value = String::new();
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || c == '>' || (c == '/' && self.starts_with("/>")) {
                        break;
                    }
                    value.push(c);
                    self.pos += 1;
                }
                Ok(decode_entities(&value))
            }
        }
    }
}

/// Decode the entities the serialiser emits. A single left-to-right scan:
/// decoded output is never rescanned, so `&amp;amp;` yields `&amp;`.
fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    const ENTITIES: [(&str, char); 4] = [
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
    ];
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES.iter().find(|(name, _)| rest.starts_with(name)) {
            Some((name, ch)) => {
                out.push(*ch);
                rest = &rest[name.len()..];
            }
            None => {
                // Bare ampersand passes through untouched
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// =============================================================================
// TESTS
// =============================================================================
