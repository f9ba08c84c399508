// crates/scan-manager-report/src/xml.rs
// ============================================================================
// Module: XML Writer
// Description: Minimal escaping writer for the canonical report document.
// Purpose: Emit well-formed XML without pulling a markup dependency the
//          rest of the workspace has no use for.
// Dependencies: none
// ============================================================================

//! ## Overview
//! The canonical report document is flat and fully controlled by the
//! pipeline, so a small push writer suffices: open/close element, text
//! element, and attribute escaping. Text escapes `&`, `<`, `>`;
//! attribute values additionally escape quotes.

// ============================================================================
// SECTION: Escaping
// ============================================================================

/// Escapes character data.
#[must_use]
pub fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes an attribute value.
#[must_use]
pub fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Push writer building the document in memory.
#[derive(Debug, Default)]
pub struct XmlWriter {
    /// Accumulated document text.
    buffer: String,
    /// Open element stack.
    stack: Vec<String>,
}

impl XmlWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an element without attributes.
    pub fn open(&mut self, name: &str) {
        self.buffer.push('<');
        self.buffer.push_str(name);
        self.buffer.push('>');
        self.stack.push(name.to_string());
    }

    /// Opens an element with attributes.
    pub fn open_with(&mut self, name: &str, attributes: &[(&str, &str)]) {
        self.buffer.push('<');
        self.buffer.push_str(name);
        for (key, value) in attributes {
            self.buffer.push(' ');
            self.buffer.push_str(key);
            self.buffer.push_str("=\"");
            self.buffer.push_str(&escape_attr(value));
            self.buffer.push('"');
        }
        self.buffer.push('>');
        self.stack.push(name.to_string());
    }

    /// Closes the innermost open element.
    pub fn close(&mut self) {
        if let Some(name) = self.stack.pop() {
            self.buffer.push_str("</");
            self.buffer.push_str(&name);
            self.buffer.push('>');
        }
    }

    /// Writes `<name>text</name>`.
    pub fn text_element(&mut self, name: &str, text: &str) {
        self.buffer.push('<');
        self.buffer.push_str(name);
        self.buffer.push('>');
        self.buffer.push_str(&escape_text(text));
        self.buffer.push_str("</");
        self.buffer.push_str(name);
        self.buffer.push('>');
    }

    /// Writes `<name/>`.
    pub fn empty_element(&mut self, name: &str) {
        self.buffer.push('<');
        self.buffer.push_str(name);
        self.buffer.push_str("/>");
    }

    /// Writes already-escaped raw text.
    pub fn raw(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Finishes the document, closing any open elements.
    #[must_use]
    pub fn finish(mut self) -> String {
        while !self.stack.is_empty() {
            self.close();
        }
        self.buffer
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::XmlWriter;
    use super::escape_attr;
    use super::escape_text;

    #[test]
    fn text_and_attr_escaping_differ_on_quotes() {
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(escape_attr("he said \"hi\""), "he said &quot;hi&quot;");
        assert_eq!(escape_text("plain"), "plain");
    }

    #[test]
    fn writer_balances_elements() {
        let mut writer = XmlWriter::new();
        writer.open_with("report", &[("id", "abc")]);
        writer.open("task");
        writer.text_element("name", "DMZ <weekly>");
        writer.close();
        writer.empty_element("scan_end");
        let document = writer.finish();
        assert_eq!(
            document,
            "<report id=\"abc\"><task><name>DMZ &lt;weekly&gt;</name></task>\
             <scan_end/></report>"
        );
    }
}
