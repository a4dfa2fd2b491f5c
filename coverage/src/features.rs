//! Structural feature extraction.
//!
//! Each source file is stripped of line comments (see [`crate::scan`]) and
//! then matched against a fixed set of patterns. Every distinct match yields
//! one namespaced tag:
//!
//! - `class:<name>`: document class or template
//! - `import:<name>`: package imports
//! - `block:<name>`: environments and set-rule targets
//! - `construct:<id>`: presence-only constructs
//!
//! Directory items produce the union of their files' tags.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use corpus_lab_core::{FeatureSet, SourceKind};
use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::scan::{ESCAPE_CHAR, strip_comments};

static LATEX_PATTERNS: LazyLock<FeaturePatterns> = LazyLock::new(FeaturePatterns::latex);
static TYPST_PATTERNS: LazyLock<FeaturePatterns> = LazyLock::new(FeaturePatterns::typst);

/// A capturing pattern whose first group becomes the tag value.
struct CaptureRule {
    category: &'static str,
    value_prefix: &'static str,
    regex: Regex,
    /// Split the capture on commas (`\usepackage{a,b}`).
    multi_valued: bool,
}

struct FeaturePatterns {
    captures: Vec<CaptureRule>,
    constructs: Vec<(&'static str, Regex)>,
}

impl FeaturePatterns {
    fn latex() -> Self {
        // All regexes here are compile-time constants. An expect() failure
        // indicates a programmer error in the pattern.
        let captures = vec![
            CaptureRule {
                category: "class",
                value_prefix: "",
                regex: Regex::new(r"\\documentclass(?:\[[^\]]*\])?\{([^}]+)\}")
                    .expect("static regex must compile"),
                multi_valued: true,
            },
            CaptureRule {
                category: "import",
                value_prefix: "",
                regex: Regex::new(r"\\usepackage(?:\[[^\]]*\])?\{([^}]+)\}")
                    .expect("static regex must compile"),
                multi_valued: true,
            },
            CaptureRule {
                category: "block",
                value_prefix: "",
                regex: Regex::new(r"\\begin\{([^}]+)\}").expect("static regex must compile"),
                multi_valued: false,
            },
        ];

        let constructs = [
            ("bibliography", r"\\bibliography\b"),
            ("addbibresource", r"\\addbibresource\b"),
            ("printbibliography", r"\\printbibliography\b"),
            ("newcommand", r"\\newcommand\b"),
            ("DeclareMathOperator", r"\\DeclareMathOperator\b"),
            ("newtheorem", r"\\newtheorem\b"),
            ("includegraphics", r"\\includegraphics\b"),
            ("tikzpicture", r"\\tikzpicture\b"),
            ("tikzpicture-env", r"\\begin\{tikzpicture\}"),
            ("algorithm-env", r"\\begin\{algorithm\}"),
            ("algorithmic-env", r"\\begin\{algorithmic\}"),
            ("lstlisting-env", r"\\begin\{lstlisting\}"),
            ("minted-env", r"\\begin\{minted\}"),
        ];

        Self {
            captures,
            constructs: compile_constructs(&constructs),
        }
    }

    fn typst() -> Self {
        let captures = vec![
            CaptureRule {
                category: "class",
                value_prefix: "",
                regex: Regex::new(r"#show:\s*([A-Za-z_][A-Za-z0-9_-]*)")
                    .expect("static regex must compile"),
                multi_valued: false,
            },
            CaptureRule {
                category: "import",
                value_prefix: "",
                regex: Regex::new(r#"#import\s+"@[A-Za-z0-9_-]+/([A-Za-z0-9_-]+):"#)
                    .expect("static regex must compile"),
                multi_valued: false,
            },
            CaptureRule {
                category: "block",
                value_prefix: "set-",
                regex: Regex::new(r"#set\s+([A-Za-z_][A-Za-z0-9_.-]*)\s*\(")
                    .expect("static regex must compile"),
                multi_valued: false,
            },
        ];

        let constructs = [
            ("bibliography", r"#bibliography\("),
            ("figure", r"#figure\("),
            ("table", r"#table\("),
            ("raw-block", r"```"),
            ("equation-block", r"\$\s+[^$]*?\S[^$]*?\s+\$"),
            ("let-function", r"#let\s+[A-Za-z_][A-Za-z0-9_-]*\("),
            ("include", r"#include\s"),
        ];

        Self {
            captures,
            constructs: compile_constructs(&constructs),
        }
    }
}

fn compile_constructs(specs: &[(&'static str, &str)]) -> Vec<(&'static str, Regex)> {
    specs
        .iter()
        .map(|(id, pattern)| (*id, Regex::new(pattern).expect("static regex must compile")))
        .collect()
}

/// Extracts feature tags from source text, files and item directories.
///
/// # Examples
///
/// ```
/// use corpus_lab_coverage::features::FeatureExtractor;
/// use corpus_lab_core::SourceKind;
///
/// let extractor = FeatureExtractor::new(SourceKind::Latex);
/// let tags = extractor.extract_text(
///     "\\documentclass[11pt]{article}\n\\usepackage{amsmath,graphicx} % \\usepackage{hidden}\n",
/// );
/// assert!(tags.contains("class:article"));
/// assert!(tags.contains("import:graphicx"));
/// assert!(!tags.contains("import:hidden"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    kind: SourceKind,
    max_depth: Option<usize>,
}

impl FeatureExtractor {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            max_depth: None,
        }
    }

    /// Caps how many directory levels below an item root are searched.
    /// `Some(0)` only reads files directly inside the root.
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Line-comment marker for this extractor's source kind.
    pub fn comment_marker(&self) -> &'static str {
        self.kind.comment_marker()
    }

    fn patterns(&self) -> &'static FeaturePatterns {
        match self.kind {
            SourceKind::Latex => &LATEX_PATTERNS,
            SourceKind::Typst => &TYPST_PATTERNS,
        }
    }

    /// Extracts tags from raw source text.
    pub fn extract_text(&self, text: &str) -> FeatureSet {
        let text = strip_comments(text, self.comment_marker(), ESCAPE_CHAR);
        let patterns = self.patterns();
        let mut features = FeatureSet::new();

        for rule in &patterns.captures {
            for caps in rule.regex.captures_iter(&text) {
                let Some(raw) = caps.get(1).map(|m| m.as_str()) else {
                    continue;
                };
                let values: Vec<&str> = if rule.multi_valued {
                    raw.split(',').collect()
                } else {
                    vec![raw]
                };
                for value in values {
                    let value = value.trim();
                    if !value.is_empty() {
                        features.insert(format!("{}:{}{value}", rule.category, rule.value_prefix));
                    }
                }
            }
        }

        for (id, regex) in &patterns.constructs {
            if regex.is_match(&text) {
                features.insert(format!("construct:{id}"));
            }
        }

        features
    }

    /// Extracts tags from one file. Unreadable files contribute nothing.
    pub fn extract_file(&self, path: &Path) -> FeatureSet {
        match fs::read(path) {
            Ok(bytes) => self.extract_text(&String::from_utf8_lossy(&bytes)),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Skipping unreadable source");
                FeatureSet::new()
            }
        }
    }

    /// Extracts the union of tags over an item.
    ///
    /// A file item is read directly; a directory item contributes every
    /// source file beneath it.
    pub fn extract_item(&self, root: &Path) -> FeatureSet {
        if root.is_file() {
            return self.extract_file(root);
        }
        let mut features = FeatureSet::new();
        for path in self.source_files(root) {
            features.extend(self.extract_file(&path));
        }
        features
    }

    /// Lists source files below `root` in a stable order.
    pub fn source_files(&self, root: &Path) -> Vec<PathBuf> {
        collect_source_files(root, self.kind, self.max_depth)
    }
}

/// Walks `root` for files with `kind`'s extension, sorted by path.
///
/// Unreadable directory entries are skipped. `max_depth` counts directory
/// levels below `root`.
pub fn collect_source_files(root: &Path, kind: SourceKind, max_depth: Option<usize>) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(root).sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth.saturating_add(1));
    }
    walker
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| kind.is_source_file(path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latex() -> FeatureExtractor {
        FeatureExtractor::new(SourceKind::Latex)
    }

    #[test]
    fn test_latex_class_and_imports_split_on_commas() {
        let tags = latex().extract_text(
            "\\documentclass[twocolumn]{revtex4-2, aps}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amsmath , amssymb,}\n",
        );
        let expected: FeatureSet = [
            "class:aps",
            "class:revtex4-2",
            "import:amsmath",
            "import:amssymb",
            "import:inputenc",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(tags, expected);
    }

    #[test]
    fn test_latex_blocks_and_constructs() {
        let tags = latex().extract_text(
            "\\begin{document}\n\\begin{tikzpicture}\\end{tikzpicture}\n\\newcommand{\\R}{\\mathbb{R}}\n\\bibliographystyle{plain}\n",
        );
        assert!(tags.contains("block:document"));
        assert!(tags.contains("block:tikzpicture"));
        assert!(tags.contains("construct:tikzpicture-env"));
        assert!(tags.contains("construct:newcommand"));
        assert!(!tags.contains("construct:bibliography"));
        assert!(!tags.contains("construct:tikzpicture"));
    }

    #[test]
    fn test_commented_directives_are_ignored() {
        let tags = latex().extract_text("% \\usepackage{hidden}\n100\\% \\usepackage{kept}\n");
        assert!(tags.contains("import:kept"));
        assert!(!tags.contains("import:hidden"));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let text = "\\documentclass{article}\n\\usepackage{a,b}\n\\begin{algorithm}\n";
        assert_eq!(latex().extract_text(text), latex().extract_text(text));
    }

    #[test]
    fn test_typst_patterns() {
        let extractor = FeatureExtractor::new(SourceKind::Typst);
        let tags = extractor.extract_text(
            "#import \"@preview/cetz:0.2.2\": canvas\n#show: ieee.with(title: [T])\n#set page(paper: \"a4\") // #set text(size: 9pt)\n#figure(image(\"a.png\"))\n$ x + y $\n",
        );
        assert!(tags.contains("import:cetz"));
        assert!(tags.contains("class:ieee"));
        assert!(tags.contains("block:set-page"));
        assert!(!tags.contains("block:set-text"));
        assert!(tags.contains("construct:figure"));
        assert!(tags.contains("construct:equation-block"));
        assert!(!tags.contains("construct:bibliography"));
    }

    #[test]
    fn test_extract_item_unions_files_and_skips_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sections")).unwrap();
        fs::write(dir.path().join("main.tex"), "\\documentclass{article}\n").unwrap();
        fs::write(dir.path().join("sections/intro.TEX"), "\\usepackage{hyperref}\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "\\usepackage{ignored}\n").unwrap();

        let tags = latex().extract_item(dir.path());
        assert!(tags.contains("class:article"));
        assert!(tags.contains("import:hyperref"));
        assert!(!tags.contains("import:ignored"));
    }

    #[test]
    fn test_max_depth_limits_walk() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.tex"), "").unwrap();
        fs::write(dir.path().join("a/mid.tex"), "").unwrap();
        fs::write(dir.path().join("a/b/deep.tex"), "").unwrap();

        let shallow = collect_source_files(dir.path(), SourceKind::Latex, Some(1));
        assert_eq!(shallow.len(), 2);
        let all = collect_source_files(dir.path(), SourceKind::Latex, None);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_unreadable_file_contributes_nothing() {
        let tags = latex().extract_file(Path::new("/nonexistent/definitely/missing.tex"));
        assert!(tags.is_empty());
    }

    #[test]
    fn test_non_utf8_bytes_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.tex");
        let mut bytes = b"\\usepackage{babel}\n\\title{Caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"}\n");
        fs::write(&path, bytes).unwrap();
        assert!(latex().extract_file(&path).contains("import:babel"));
    }
}
