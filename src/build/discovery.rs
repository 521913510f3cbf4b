//! Source file discovery for the build system.
//!
//! Expands the glob patterns from the path table relative to the project root,
//! applies exclusion filters and splits each category into its project files
//! and its common (vendor) files. The two selections never overlap.

use crate::build::output::to_slash;
use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Error during source discovery.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// Invalid glob pattern
    #[error("Invalid glob pattern '{0}': {1}")]
    InvalidPattern(String, glob::PatternError),
    /// IO error during file enumeration
    #[error("IO error during discovery: {0}")]
    Io(#[from] std::io::Error),
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A source file selected for a build category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the project root, `/`-separated
    pub project_path: String,
    /// Path relative to the glob base of the pattern that selected it
    pub relative: String,
}

impl SourceFile {
    /// File name without directories.
    pub fn file_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or(&self.relative)
    }

    /// File name without its final extension.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }
}

/// Expand `{a,b}` alternations into separate patterns.
///
/// Nested groups are expanded recursively. A `{` with no matching `}` is kept
/// literally.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0;
    let mut close = None;
    let mut splits = Vec::new();
    for (idx, ch) in pattern[open..].char_indices() {
        let idx = open + idx;
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(idx);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(idx),
            _ => {}
        }
    }

    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = vec![open];
    bounds.extend(splits);
    bounds.push(close);

    bounds
        .windows(2)
        .flat_map(|w| {
            let alternative = &pattern[w[0] + 1..w[1]];
            expand_braces(&format!("{}{}{}", prefix, alternative, suffix))
        })
        .collect()
}

/// The literal directory prefix of a glob pattern.
///
/// `src/js/**/*.ts` has base `src/js`; a pattern without wildcards has its
/// parent directory as base.
pub fn glob_base(pattern: &str) -> String {
    let components: Vec<&str> = pattern.split('/').collect();
    let literal: Vec<&str> = components
        .iter()
        .take_while(|c| !c.contains(&['*', '?', '[', '{'][..]))
        .copied()
        .collect();

    if literal.len() == components.len() {
        // No wildcards: the last component is the file itself
        literal[..literal.len().saturating_sub(1)].join("/")
    } else {
        literal.join("/")
    }
}

/// Check that a pattern (and every brace expansion of it) compiles.
pub fn check_pattern(pattern: &str) -> Result<(), glob::PatternError> {
    for expanded in expand_braces(pattern) {
        Pattern::new(&expanded)?;
    }
    Ok(())
}

/// A compiled list of patterns matched against project-relative paths.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn new(patterns: &[String]) -> Result<Self, DiscoveryError> {
        let mut compiled = Vec::new();
        for pattern in patterns {
            for expanded in expand_braces(pattern) {
                let p = Pattern::new(&expanded)
                    .map_err(|e| DiscoveryError::InvalidPattern(pattern.clone(), e))?;
                compiled.push(p);
            }
        }
        Ok(Self { patterns: compiled })
    }

    /// Check a project-relative, `/`-separated path against every pattern.
    pub fn matches(&self, project_path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches_with(project_path, MATCH_OPTIONS))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Discover files matching a list of patterns, in pattern order.
///
/// Files within one pattern are sorted; a file matched by more than one
/// pattern keeps its first position.
pub fn discover(root: &Path, patterns: &[String]) -> Result<Vec<SourceFile>, DiscoveryError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    let escaped_root = Pattern::escape(&root.to_string_lossy());

    for pattern in patterns {
        for expanded in expand_braces(pattern) {
            let base = glob_base(&expanded);
            let full_pattern = format!("{}/{}", escaped_root.trim_end_matches('/'), expanded);
            let entries = glob::glob_with(&full_pattern, MATCH_OPTIONS)
                .map_err(|e| DiscoveryError::InvalidPattern(pattern.clone(), e))?;

            let mut matched = Vec::new();
            for entry in entries {
                match entry {
                    Ok(path) if path.is_file() => matched.push(path),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("error reading path during discovery: {}", e);
                    }
                }
            }
            matched.sort();

            for path in matched {
                if !seen.insert(path.clone()) {
                    continue;
                }
                let Ok(project_relative) = path.strip_prefix(root) else {
                    continue;
                };
                let project_path = to_slash(project_relative);
                let relative = if base.is_empty() {
                    project_path.clone()
                } else {
                    project_path
                        .strip_prefix(&format!("{}/", base))
                        .unwrap_or(&project_path)
                        .to_string()
                };
                files.push(SourceFile { path, project_path, relative });
            }
        }
    }

    Ok(files)
}

/// Files of one category split into project files and common files.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Selected by `sources`, minus `exclude`, minus everything in `common`
    pub main: Vec<SourceFile>,
    /// Selected by `common`, in list order
    pub common: Vec<SourceFile>,
}

impl Selection {
    /// Whether a file appears in both halves (never true for a built selection).
    pub fn overlaps(&self) -> bool {
        let common: HashSet<&PathBuf> = self.common.iter().map(|f| &f.path).collect();
        self.main.iter().any(|f| common.contains(&f.path))
    }
}

/// Select the files of a category.
pub fn select_category(
    root: &Path,
    sources: &[String],
    exclude: &[String],
    common: &[String],
) -> Result<Selection, DiscoveryError> {
    let common_files = discover(root, common)?;
    let common_paths: HashSet<PathBuf> = common_files.iter().map(|f| f.path.clone()).collect();
    let excluded = PatternSet::new(exclude)?;

    let main = discover(root, sources)?
        .into_iter()
        .filter(|f| !excluded.matches(&f.project_path) && !common_paths.contains(&f.path))
        .collect();

    Ok(Selection { main, common: common_files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(&path).unwrap().write_all(b"x").unwrap();
        path
    }

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_expand_braces() {
        assert_eq!(expand_braces("a/*.png"), vec!["a/*.png"]);
        assert_eq!(expand_braces("a/*.{png,jpg}"), vec!["a/*.png", "a/*.jpg"]);
        assert_eq!(
            expand_braces("{a,b}/*.{x,y}"),
            vec!["a/*.x", "a/*.y", "b/*.x", "b/*.y"]
        );
        assert_eq!(expand_braces("a/{b,{c,d}}"), vec!["a/b", "a/c", "a/d"]);
        assert_eq!(expand_braces("a/{unclosed"), vec!["a/{unclosed"]);
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("src/js/**/*.ts"), "src/js");
        assert_eq!(glob_base("src/assets/**/*.{png,jpg}"), "src/assets");
        assert_eq!(glob_base("src/js/common/vendors.ts"), "src/js/common");
        assert_eq!(glob_base("*.html"), "");
        assert_eq!(glob_base("index.html"), "");
    }

    #[test]
    fn test_check_pattern() {
        assert!(check_pattern("src/**/*.{png,jpg}").is_ok());
        assert!(check_pattern("src/[*.png").is_err());
    }

    #[test]
    fn test_pattern_set_matches() {
        let set = PatternSet::new(&patterns(&["src/js/common/**/*", "**/*.d.ts"])).unwrap();
        assert!(set.matches("src/js/common/vendors.ts"));
        assert!(set.matches("src/js/common/lib/jquery.js"));
        assert!(set.matches("src/js/types/global.d.ts"));
        assert!(!set.matches("src/js/pages/home.ts"));
    }

    #[test]
    fn test_discover_recursive_with_relative_paths() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "src/js/app.ts");
        create_test_file(temp.path(), "src/js/pages/home.ts");
        create_test_file(temp.path(), "src/js/readme.md");

        let files = discover(temp.path(), &patterns(&["src/js/**/*.ts"])).unwrap();
        let relative: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(relative, vec!["app.ts", "pages/home.ts"]);
        assert_eq!(files[1].project_path, "src/js/pages/home.ts");
    }

    #[test]
    fn test_discover_braces() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "src/assets/a.png");
        create_test_file(temp.path(), "src/assets/fonts/b.woff2");
        create_test_file(temp.path(), "src/assets/c.txt");

        let files =
            discover(temp.path(), &patterns(&["src/assets/**/*.{png,woff2}"])).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_discover_keeps_pattern_order_and_dedups() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "src/css/common/high/z.css");
        create_test_file(temp.path(), "src/css/common/a.css");

        let files = discover(
            temp.path(),
            &patterns(&["src/css/common/high/**/*.css", "src/css/common/**/*.css"]),
        )
        .unwrap();
        let names: Vec<_> = files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["z.css", "a.css"]);
    }

    #[test]
    fn test_select_category_is_disjoint() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "src/js/common/vendors.ts");
        create_test_file(temp.path(), "src/js/common/lib/helper.ts");
        create_test_file(temp.path(), "src/js/app.ts");
        create_test_file(temp.path(), "src/js/types.d.ts");

        let selection = select_category(
            temp.path(),
            &patterns(&["src/js/**/*.ts"]),
            &patterns(&["src/js/common/**/*", "**/*.d.ts"]),
            &patterns(&["src/js/common/vendors.ts"]),
        )
        .unwrap();

        let main: Vec<_> = selection.main.iter().map(|f| f.project_path.as_str()).collect();
        assert_eq!(main, vec!["src/js/app.ts"]);
        assert_eq!(selection.common.len(), 1);
        assert!(!selection.overlaps());
    }

    #[test]
    fn test_select_category_common_wins_without_exclude() {
        // A common file inside the main tree is still removed from main
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "src/scss/common.scss");
        create_test_file(temp.path(), "src/scss/site.scss");

        let selection = select_category(
            temp.path(),
            &patterns(&["src/scss/**/*.scss"]),
            &[],
            &patterns(&["src/scss/common.scss"]),
        )
        .unwrap();

        assert_eq!(selection.main.len(), 1);
        assert_eq!(selection.main[0].file_name(), "site.scss");
        assert!(!selection.overlaps());
    }

    #[test]
    fn test_source_file_stem() {
        let file = SourceFile {
            path: PathBuf::from("/p/src/js/app.min.js"),
            project_path: "src/js/app.min.js".to_string(),
            relative: "app.min.js".to_string(),
        };
        assert_eq!(file.stem(), "app.min");
        assert_eq!(file.extension(), Some("js"));
    }
}
