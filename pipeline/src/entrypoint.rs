//! Entrypoint discovery: which source file of an item is the document root.
//!
//! Ranking is pure over [`EntryCandidate`] values; only
//! [`gather_candidates`] touches the filesystem.

use std::cmp::Reverse;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use corpus_lab_core::SourceKind;
use corpus_lab_coverage::features::collect_source_files;
use corpus_lab_coverage::scan::{ESCAPE_CHAR, strip_comments};
use regex::Regex;
use tracing::debug;

/// Bytes read from the head of each candidate when looking for markers.
pub const HEAD_LIMIT: u64 = 1024 * 1024;

/// Size bonus is one point per KiB, capped here.
const SIZE_BONUS_CAP: u64 = 100;

/// Marker evidence about one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCandidate {
    pub path: PathBuf,
    /// Declares a document class (LaTeX) or applies a template (Typst).
    pub has_class_marker: bool,
    /// Opens the document body. Never set for Typst.
    pub has_body_marker: bool,
    /// Position in the kind's preferred file name list, if any.
    pub preferred_rank: Option<usize>,
    pub size: u64,
}

impl EntryCandidate {
    /// `5·class + 3·body + min(size_kib, 100)`.
    pub fn score(&self) -> u64 {
        let class = if self.has_class_marker { 5 } else { 0 };
        let body = if self.has_body_marker { 3 } else { 0 };
        class + body + (self.size / 1024).min(SIZE_BONUS_CAP)
    }

    fn tier(&self) -> u8 {
        if self.has_class_marker {
            0
        } else if self.has_body_marker {
            1
        } else {
            2
        }
    }
}

/// Orders candidates best-first.
///
/// Preferred names come first, then class-marker files, then body-marker
/// files, then everything else. Within a tier higher score wins, then larger
/// size, then the lexicographically smaller path.
pub fn rank_candidates(candidates: &[EntryCandidate]) -> Vec<&EntryCandidate> {
    let mut ranked: Vec<&EntryCandidate> = candidates.iter().collect();
    ranked.sort_by_key(|c| {
        (
            c.preferred_rank.unwrap_or(usize::MAX),
            c.tier(),
            Reverse(c.score()),
            Reverse(c.size),
            c.path.clone(),
        )
    });
    ranked
}

/// Best candidate, or `None` when there are none.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use corpus_lab_pipeline::entrypoint::{EntryCandidate, choose_entrypoint};
///
/// let body_only = EntryCandidate {
///     path: PathBuf::from("sections/intro.tex"),
///     has_class_marker: false,
///     has_body_marker: true,
///     preferred_rank: None,
///     size: 400 * 1024,
/// };
/// let main = EntryCandidate {
///     path: PathBuf::from("main.tex"),
///     has_class_marker: true,
///     has_body_marker: true,
///     preferred_rank: None,
///     size: 2048,
/// };
/// let candidates = [body_only, main];
/// let best = choose_entrypoint(&candidates).unwrap();
/// assert_eq!(best.path, PathBuf::from("main.tex"));
/// ```
pub fn choose_entrypoint(candidates: &[EntryCandidate]) -> Option<&EntryCandidate> {
    rank_candidates(candidates).into_iter().next()
}

struct EntryMarkers {
    class: Regex,
    body: Option<Regex>,
    preferred: &'static [&'static str],
    max_depth: Option<usize>,
}

static LATEX_MARKERS: LazyLock<EntryMarkers> = LazyLock::new(|| EntryMarkers {
    class: Regex::new(r"\\documentclass\s*(?:\[[^\]]*\])?\s*\{[^}]+\}")
        .expect("static regex must compile"),
    body: Some(Regex::new(r"\\begin\s*\{document\}").expect("static regex must compile")),
    preferred: &[],
    max_depth: None,
});

static TYPST_MARKERS: LazyLock<EntryMarkers> = LazyLock::new(|| EntryMarkers {
    class: Regex::new(r"(?m)^\s*#show\s*:").expect("static regex must compile"),
    body: None,
    preferred: &["main.typ", "template.typ", "paper.typ", "article.typ", "thesis.typ"],
    max_depth: Some(4),
});

fn markers(kind: SourceKind) -> &'static EntryMarkers {
    match kind {
        SourceKind::Latex => &LATEX_MARKERS,
        SourceKind::Typst => &TYPST_MARKERS,
    }
}

fn read_head(path: &Path) -> std::io::Result<(String, u64)> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let mut head = Vec::new();
    file.take(HEAD_LIMIT).read_to_end(&mut head)?;
    Ok((String::from_utf8_lossy(&head).into_owned(), size))
}

/// Builds a candidate from the first [`HEAD_LIMIT`] bytes of `path`.
///
/// Returns `None` for unreadable or empty files. Commented-out markers do
/// not count.
pub fn inspect_candidate(path: &Path, kind: SourceKind) -> Option<EntryCandidate> {
    let (head, size) = match read_head(path) {
        Ok(read) => read,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "Discarding unreadable candidate");
            return None;
        }
    };
    if size == 0 {
        return None;
    }

    let markers = markers(kind);
    let text = strip_comments(&head, kind.comment_marker(), ESCAPE_CHAR);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    Some(EntryCandidate {
        path: path.to_path_buf(),
        has_class_marker: markers.class.is_match(&text),
        has_body_marker: markers.body.as_ref().is_some_and(|re| re.is_match(&text)),
        preferred_rank: markers.preferred.iter().position(|name| *name == file_name),
        size,
    })
}

/// Inspects every source file of the item at `root`.
///
/// A file root is its own single candidate.
pub fn gather_candidates(root: &Path, kind: SourceKind) -> Vec<EntryCandidate> {
    let paths = if root.is_file() {
        if kind.is_source_file(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        }
    } else {
        collect_source_files(root, kind, markers(kind).max_depth)
    };
    paths
        .iter()
        .filter_map(|path| inspect_candidate(path, kind))
        .collect()
}

/// Picks the entrypoint file for the item at `root`.
pub fn find_entrypoint(root: &Path, kind: SourceKind) -> Option<PathBuf> {
    let candidates = gather_candidates(root, kind);
    let chosen = choose_entrypoint(&candidates).map(|c| c.path.clone());
    debug!(
        root = %root.display(),
        candidates = candidates.len(),
        entrypoint = ?chosen,
        "Resolved entrypoint"
    );
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn candidate(path: &str, class: bool, body: bool, size_kib: u64) -> EntryCandidate {
        EntryCandidate {
            path: PathBuf::from(path),
            has_class_marker: class,
            has_body_marker: body,
            preferred_rank: None,
            size: size_kib * 1024,
        }
    }

    fn ranked_paths(candidates: &[EntryCandidate]) -> Vec<String> {
        rank_candidates(candidates)
            .iter()
            .map(|c| c.path.display().to_string())
            .collect()
    }

    #[test]
    fn test_score_caps_size_bonus() {
        assert_eq!(candidate("a.tex", true, true, 2).score(), 10);
        assert_eq!(candidate("a.tex", false, false, 5000).score(), 100);
        assert_eq!(candidate("a.tex", true, false, 0).score(), 5);
    }

    #[test]
    fn test_class_marker_tier_beats_larger_body_file() {
        let candidates = vec![
            candidate("chapter.tex", false, true, 900),
            candidate("main.tex", true, false, 1),
            candidate("macros.tex", false, false, 50),
        ];
        assert_eq!(
            ranked_paths(&candidates),
            vec!["main.tex", "chapter.tex", "macros.tex"]
        );
    }

    #[test]
    fn test_ties_break_on_size_then_path() {
        let candidates = vec![
            candidate("b.tex", true, true, 200),
            candidate("a.tex", true, true, 200),
            candidate("c.tex", true, true, 300),
        ];
        // All three hit the size cap; c is larger on disk.
        assert_eq!(ranked_paths(&candidates), vec!["c.tex", "a.tex", "b.tex"]);
    }

    #[test]
    fn test_preferred_rank_wins_over_markers() {
        let mut template = candidate("template.typ", false, false, 1);
        template.preferred_rank = Some(1);
        let mut main = candidate("main.typ", false, false, 1);
        main.preferred_rank = Some(0);
        let showy = candidate("lib.typ", true, false, 90);

        let candidates = vec![showy, template, main];
        assert_eq!(
            ranked_paths(&candidates),
            vec!["main.typ", "template.typ", "lib.typ"]
        );
    }

    #[test]
    fn test_choose_entrypoint_empty() {
        assert!(choose_entrypoint(&[]).is_none());
    }

    #[test]
    fn test_find_entrypoint_latex_ignores_commented_class() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("draft.tex"),
            "% \\documentclass{article}\n\\section{Old}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("paper.tex"),
            "\\documentclass{article}\n\\begin{document}\nHi\n\\end{document}\n",
        )
        .unwrap();
        fs::write(dir.path().join("empty.tex"), "").unwrap();

        let found = find_entrypoint(dir.path(), SourceKind::Latex).unwrap();
        assert_eq!(found, dir.path().join("paper.tex"));
        assert_eq!(gather_candidates(dir.path(), SourceKind::Latex).len(), 2);
    }

    #[test]
    fn test_find_entrypoint_typst_prefers_named_file_and_caps_depth() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lib.typ"), "#show: conf\n").unwrap();
        fs::create_dir_all(dir.path().join("template")).unwrap();
        fs::write(dir.path().join("template/main.typ"), "= Title\n").unwrap();
        let deep = dir.path().join("a/b/c/d/e");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("thesis.typ"), "= Deep\n").unwrap();

        let found = find_entrypoint(dir.path(), SourceKind::Typst).unwrap();
        assert_eq!(found, dir.path().join("template/main.typ"));

        let names: Vec<_> = gather_candidates(dir.path(), SourceKind::Typst)
            .into_iter()
            .map(|c| c.path)
            .collect();
        assert!(!names.contains(&deep.join("thesis.typ")));
    }

    #[test]
    fn test_find_entrypoint_none_without_sources() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "nothing here").unwrap();
        assert!(find_entrypoint(dir.path(), SourceKind::Latex).is_none());
    }

    #[test]
    fn test_file_root_is_its_own_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("single.tex");
        fs::write(&file, "\\begin{document}x\\end{document}").unwrap();
        assert_eq!(find_entrypoint(&file, SourceKind::Latex), Some(file));
    }
}
