//! Building the ordered list of items a batch should process.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use corpus_lab_core::{Item, SourceKind};
use corpus_lab_coverage::corpus::list_items;
use corpus_lab_coverage::error::CoverageError;
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::PipelineError;

#[derive(Debug, Deserialize)]
struct SelectionFile {
    #[serde(default)]
    selected: Option<Vec<SelectedDir>>,
    #[serde(default)]
    dirs: Option<Vec<PathBuf>>,
}

#[derive(Debug, Deserialize)]
struct SelectedDir {
    dir: PathBuf,
}

/// Reads the item directories listed in a selection artifact.
///
/// Accepts `{"selected": [{"dir": ...}, ...]}` as written by the selector,
/// and a bare `{"dirs": [...]}` list.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] or [`PipelineError::Json`] if the file
/// cannot be read or parsed, and [`PipelineError::UnsupportedSelection`] if
/// it has neither key.
pub fn load_selection(path: &Path) -> Result<Vec<Item>, PipelineError> {
    let file = fs::File::open(path)?;
    let selection: SelectionFile = serde_json::from_reader(BufReader::new(file))?;

    let dirs: Vec<PathBuf> = match (selection.selected, selection.dirs) {
        (Some(selected), _) => selected.into_iter().map(|entry| entry.dir).collect(),
        (None, Some(dirs)) => dirs,
        (None, None) => return Err(PipelineError::UnsupportedSelection(path.to_path_buf())),
    };
    debug!(path = %path.display(), items = dirs.len(), "Loaded selection");
    Ok(dirs.into_iter().map(Item::from_path).collect())
}

/// All first-level directories of `corpus_dir`, sorted by name.
pub fn corpus_items(corpus_dir: &Path) -> Result<Vec<Item>, PipelineError> {
    Ok(list_items(corpus_dir, &[])?)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Separator between path components in ids built from nested paths.
pub const ID_SEPARATOR: &str = "__";

/// Id for `path` relative to `base`, joining components with
/// [`ID_SEPARATOR`]. Falls back to the final component outside `base`.
fn relative_id(base: &Path, path: &Path) -> String {
    let parts: Vec<String> = path
        .strip_prefix(base)
        .map(|rel| {
            rel.components()
                .filter_map(|component| match component {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    if parts.is_empty() {
        Item::from_path(path).id
    } else {
        parts.join(ID_SEPARATOR)
    }
}

/// Makes every id in `items` unique, keeping the first occurrence's id.
///
/// Repeated roots are dropped. A different root whose id is already taken
/// gets a numbered suffix (`ieee`, `ieee__2`, ...), since ids name run
/// directories.
pub fn unique_items(items: Vec<Item>) -> Vec<Item> {
    let mut roots = HashSet::new();
    let mut ids = HashSet::new();
    let mut unique = Vec::with_capacity(items.len());
    for item in items {
        if !roots.insert(item.root.clone()) {
            warn!(item = %item.id, root = %item.root.display(), "Dropping repeated worklist entry");
            continue;
        }
        let mut id = item.id.clone();
        let mut n = 2;
        while ids.contains(&id) {
            id = format!("{}{ID_SEPARATOR}{n}", item.id);
            n += 1;
        }
        if id != item.id {
            warn!(item = %item.id, root = %item.root.display(), renamed = %id, "Item id already taken");
        }
        ids.insert(id.clone());
        unique.push(Item::with_id(id, item.root));
    }
    unique
}

/// Items under the named template roots of a Typst corpus.
///
/// Each root contributes its sorted, non-hidden subdirectories. If no root
/// yields anything, every directory holding a `.typ` file is used instead.
/// Ids are paths relative to `corpus_dir`, so `typst-templates/ieee` becomes
/// `typst-templates__ieee`.
pub fn template_items(corpus_dir: &Path, roots: &[String]) -> Result<Vec<Item>, PipelineError> {
    if !corpus_dir.is_dir() {
        return Err(CoverageError::CorpusNotFound(corpus_dir.to_path_buf()).into());
    }

    let mut items = Vec::new();
    for root in roots {
        let base = corpus_dir.join(root);
        if !base.is_dir() {
            debug!(root = %base.display(), "Template root missing");
            continue;
        }
        let mut dirs: Vec<PathBuf> = fs::read_dir(&base)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && !is_hidden(path))
            .collect();
        dirs.sort();
        items.extend(
            dirs.into_iter()
                .map(|dir| Item::with_id(relative_id(corpus_dir, &dir), dir)),
        );
    }

    if items.is_empty() {
        let dirs: BTreeSet<PathBuf> = WalkDir::new(corpus_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| SourceKind::Typst.is_source_file(entry.path()))
            .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
            .collect();
        info!(dirs = dirs.len(), "No template roots found, using directories with .typ files");
        items.extend(
            dirs.into_iter()
                .map(|dir| Item::with_id(relative_id(corpus_dir, &dir), dir)),
        );
    }
    Ok(items)
}

/// Resolves the worklist for a run.
///
/// An explicit selection wins. Otherwise LaTeX corpora use every first-level
/// directory and Typst corpora use their template roots. Ids in the result
/// are unique (see [`unique_items`]).
pub fn load_worklist(
    corpus_dir: &Path,
    selection: Option<&Path>,
    kind: SourceKind,
    roots: &[String],
) -> Result<Vec<Item>, PipelineError> {
    let items = match (selection, kind) {
        (Some(path), _) => load_selection(path)?,
        (None, SourceKind::Latex) => corpus_items(corpus_dir)?,
        (None, SourceKind::Typst) => template_items(corpus_dir, roots)?,
    };
    Ok(unique_items(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn test_load_selection_selected_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selection.json");
        fs::write(
            &path,
            r#"{"selected": [{"dir": "/c/2401.2", "gain": 3.0}, {"dir": "/c/2401.1"}], "extra": 1}"#,
        )
        .unwrap();

        let items = load_selection(&path).unwrap();
        assert_eq!(ids(&items), vec!["2401.2", "2401.1"]);
        assert_eq!(items[0].root, PathBuf::from("/c/2401.2"));
    }

    #[test]
    fn test_load_selection_dirs_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirs.json");
        fs::write(&path, r#"{"dirs": ["corpus/a", "corpus/b"]}"#).unwrap();
        assert_eq!(ids(&load_selection(&path).unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_load_selection_rejects_unknown_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.json");
        fs::write(&path, r#"{"papers": []}"#).unwrap();
        assert!(matches!(
            load_selection(&path),
            Err(PipelineError::UnsupportedSelection(_))
        ));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_selection(&path), Err(PipelineError::Json(_))));
    }

    #[test]
    fn test_corpus_items_sorted_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b", "a", "c"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        assert_eq!(ids(&corpus_items(dir.path()).unwrap()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_template_items_from_roots() {
        let dir = tempfile::tempdir().unwrap();
        for path in ["typst-templates/zeta", "typst-templates/alpha", "typst-templates/.git"] {
            fs::create_dir_all(dir.path().join(path)).unwrap();
        }
        fs::create_dir_all(dir.path().join("ml-templates/icml")).unwrap();

        let roots = vec![
            "typst-templates".to_string(),
            "ml-templates".to_string(),
            "missing".to_string(),
        ];
        let items = template_items(dir.path(), &roots).unwrap();
        assert_eq!(
            ids(&items),
            vec!["typst-templates__alpha", "typst-templates__zeta", "ml-templates__icml"]
        );
    }

    #[test]
    fn test_template_items_fall_back_to_typ_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg/b/src")).unwrap();
        fs::create_dir_all(dir.path().join("pkg/a")).unwrap();
        fs::write(dir.path().join("pkg/b/src/lib.typ"), "").unwrap();
        fs::write(dir.path().join("pkg/a/main.typ"), "").unwrap();
        fs::write(dir.path().join("pkg/a/other.typ"), "").unwrap();

        let items = template_items(dir.path(), &["typst-templates".to_string()]).unwrap();
        assert_eq!(ids(&items), vec!["pkg__a", "pkg__b__src"]);
    }

    #[test]
    fn test_load_worklist_dispatches_on_kind() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("typst-templates/t1")).unwrap();
        fs::create_dir_all(dir.path().join("paper")).unwrap();

        let roots = vec!["typst-templates".to_string()];
        let latex = load_worklist(dir.path(), None, SourceKind::Latex, &roots).unwrap();
        assert_eq!(ids(&latex), vec!["paper", "typst-templates"]);
        let typst = load_worklist(dir.path(), None, SourceKind::Typst, &roots).unwrap();
        assert_eq!(ids(&typst), vec!["typst-templates__t1"]);
    }

    #[test]
    fn test_template_roots_sharing_a_child_name_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        for root in ["typst-templates", "ml-templates"] {
            let template = dir.path().join(root).join("ieee");
            fs::create_dir_all(&template).unwrap();
            fs::write(template.join("main.typ"), "#show: ieee\n").unwrap();
        }

        let roots = vec!["typst-templates".to_string(), "ml-templates".to_string()];
        let items = load_worklist(dir.path(), None, SourceKind::Typst, &roots).unwrap();
        assert_eq!(ids(&items), vec!["typst-templates__ieee", "ml-templates__ieee"]);
        assert_ne!(items[0].root, items[1].root);
    }

    #[test]
    fn test_selection_with_repeated_names_is_made_unique() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirs.json");
        fs::write(
            &path,
            r#"{"dirs": ["a/ieee", "b/ieee", "a/ieee", "c/ieee", "ieee__2"]}"#,
        )
        .unwrap();

        let items = load_worklist(dir.path(), Some(&path), SourceKind::Latex, &[]).unwrap();
        assert_eq!(ids(&items), vec!["ieee", "ieee__2", "ieee__3", "ieee__2__2"]);
        let roots: Vec<&Path> = items.iter().map(|item| item.root.as_path()).collect();
        assert_eq!(
            roots,
            vec![
                Path::new("a/ieee"),
                Path::new("b/ieee"),
                Path::new("c/ieee"),
                Path::new("ieee__2"),
            ]
        );
    }
}
