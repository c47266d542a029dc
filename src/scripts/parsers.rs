use regex::Regex;

/// Recognizes one flavour of generated menu entry from its raw text
/// block. The surrounding application may register richer parsers; the
/// core only needs the label for comparison and display purposes.
pub trait ContentParser: Send + Sync {
    fn label(&self) -> &str;
    fn matches(&self, content: &str) -> bool;
}

struct TemplateParser {
    label: &'static str,
    pattern: Regex,
}

impl ContentParser for TemplateParser {
    fn label(&self) -> &str {
        self.label
    }

    fn matches(&self, content: &str) -> bool {
        self.pattern.is_match(content)
    }
}

/// Ordered registry of content parsers; the first match wins.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn ContentParser>>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self { parsers: Vec::new() }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        // memtest uses linux16 as well, so it must be probed first
        registry.register_template("memtest", r"(?m)^\s*linux16\s+\S*memtest86");
        registry.register_template("linux-iso", r"(?m)^\s*loopback\s");
        registry.register_template("linux", r"(?m)^\s*linux(16)?\s");
        registry.register_template("chainloader", r"(?m)^\s*chainloader\s");
        registry
    }

    pub fn register(&mut self, parser: Box<dyn ContentParser>) {
        self.parsers.push(parser);
    }

    fn register_template(&mut self, label: &'static str, pattern: &str) {
        let pattern = Regex::new(pattern).expect("invalid built-in parser pattern");
        self.register(Box::new(TemplateParser { label, pattern }));
    }

    pub fn label_for(&self, content: &str) -> Option<String> {
        self.parsers
            .iter()
            .find(|p| p.matches(content))
            .map(|p| p.label().to_string())
    }
}
