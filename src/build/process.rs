//! Reference rewriting against the revision manifests.
//!
//! After a production build every `.css`, `.html` and `.json` file in the
//! output tree still refers to original paths such as `css/site.css`. This
//! pass replaces each reference with the fingerprinted path listed in the
//! manifests. Manifests themselves are left as written.

use crate::build::manifest::{RevManifest, REV_DIR};
use crate::build::output::OutputSink;
use crate::build::task::TaskError;
use aho_corasick::{AhoCorasick, Input, MatchKind};

/// Extensions whose contents are rewritten.
pub const REWRITE_EXTENSIONS: [&str; 3] = ["css", "html", "json"];

/// Compiled replacement table built from a merged manifest.
#[derive(Debug)]
pub struct Rewriter {
    matcher: Option<AhoCorasick>,
    /// Manifest entries in pattern order
    entries: Vec<(String, String)>,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

impl Rewriter {
    pub fn new(manifest: RevManifest) -> Result<Self, TaskError> {
        let entries: Vec<(String, String)> = manifest
            .iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if entries.is_empty() {
            return Ok(Self { matcher: None, entries });
        }

        // Leftmost-longest so `a.min.css` wins over a shorter key at the same offset
        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(entries.iter().map(|(k, _)| k))
            .map_err(TaskError::Rewrite)?;
        Ok(Self { matcher: Some(matcher), entries })
    }

    /// Rewrite every bounded occurrence of a manifest key in `text`.
    pub fn rewrite(&self, text: &str) -> String {
        let Some(matcher) = &self.matcher else {
            return text.to_string();
        };

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut pos = 0;
        while let Some(m) = matcher.find(Input::new(text).span(pos..text.len())) {
            let starts_on_boundary = !text[..m.start()].chars().next_back().is_some_and(is_name_char);
            if !starts_on_boundary || !ends_on_boundary(&text[m.end()..]) {
                // Retry one char later so a shorter overlapping key can still match
                pos = m.start() + text[m.start()..].chars().next().map_or(1, char::len_utf8);
                continue;
            }
            out.push_str(&text[last..m.start()]);
            out.push_str(&self.entries[m.pattern().as_usize()].1);
            last = m.end();
            pos = m.end();
        }
        out.push_str(&text[last..]);
        out
    }
}

/// A match must not continue into a longer file name (`a.css.map`, `a.css2`).
fn ends_on_boundary(rest: &str) -> bool {
    let mut chars = rest.chars();
    match chars.next() {
        None => true,
        Some('.') => !chars.next().is_some_and(is_name_char),
        Some(c) => !is_name_char(c),
    }
}

fn is_rewritable(path: &str) -> bool {
    if path.starts_with(&format!("{}/", REV_DIR)) {
        return false;
    }
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| REWRITE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Rewrite references in every eligible file of the sink.
///
/// Returns the paths whose contents changed. Running it a second time
/// changes nothing.
pub fn run(sink: &dyn OutputSink) -> Result<Vec<String>, TaskError> {
    let manifest = RevManifest::load_all(sink)?;
    if manifest.is_empty() {
        tracing::warn!("no manifests found in {}/, nothing to rewrite", REV_DIR);
        return Ok(Vec::new());
    }

    let rewriter = Rewriter::new(manifest)?;
    let mut changed = Vec::new();
    let paths = sink.list().map_err(|source| TaskError::Output { path: String::new(), source })?;

    for path in paths.into_iter().filter(|p| is_rewritable(p)) {
        let Some(bytes) =
            sink.read(&path).map_err(|source| TaskError::Output { path: path.clone(), source })?
        else {
            continue;
        };
        let Ok(text) = String::from_utf8(bytes) else {
            tracing::warn!("skipping non-UTF-8 file {}", path);
            continue;
        };

        let rewritten = rewriter.rewrite(&text);
        if rewritten != text {
            sink.write(&path, rewritten.as_bytes())
                .map_err(|source| TaskError::Output { path: path.clone(), source })?;
            tracing::debug!("rewrote references in {}", path);
            changed.push(path);
        }
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::output::MemoryOutput;

    fn rewriter(entries: &[(&str, &str)]) -> Rewriter {
        let mut manifest = RevManifest::new();
        for (k, v) in entries {
            manifest.insert(*k, *v);
        }
        Rewriter::new(manifest).unwrap()
    }

    #[test]
    fn test_rewrite_html_reference() {
        let r = rewriter(&[("css/a.css", "css/a-0123456789.css")]);
        assert_eq!(
            r.rewrite(r#"<link href="/css/a.css" rel="stylesheet">"#),
            r#"<link href="/css/a-0123456789.css" rel="stylesheet">"#
        );
    }

    #[test]
    fn test_rewrite_relative_css_url() {
        let r = rewriter(&[("assets/images/icons.png", "assets/images/icons-abcdef0123.png")]);
        assert_eq!(
            r.rewrite(".icon{background-image:url(../../../assets/images/icons.png)}"),
            ".icon{background-image:url(../../../assets/images/icons-abcdef0123.png)}"
        );
    }

    #[test]
    fn test_rewrite_respects_name_boundaries() {
        let r = rewriter(&[("css/a.css", "css/a-0123456789.css")]);
        assert_eq!(r.rewrite("css/a.css.map"), "css/a.css.map");
        assert_eq!(r.rewrite("xcss/a.css"), "xcss/a.css");
        assert_eq!(r.rewrite("css/a.css2"), "css/a.css2");
        assert_eq!(r.rewrite("see css/a.css."), "see css/a-0123456789.css.");
    }

    #[test]
    fn test_rewrite_prefers_longer_keys() {
        let r = rewriter(&[
            ("js/app.js", "js/app-1111111111.js"),
            ("js/app.js.js", "js/app.js-2222222222.js"),
        ]);
        assert_eq!(r.rewrite("js/app.js.js"), "js/app.js-2222222222.js");
    }

    #[test]
    fn test_rewrite_multiple_and_adjacent() {
        let r = rewriter(&[("a.css", "a-1111111111.css"), ("b.css", "b-2222222222.css")]);
        assert_eq!(r.rewrite("a.css,b.css a.css"), "a-1111111111.css,b-2222222222.css a-1111111111.css");
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let r = rewriter(&[("assets/LICENSE", "assets/LICENSE-0123456789")]);
        let once = r.rewrite("see assets/LICENSE");
        assert_eq!(once, "see assets/LICENSE-0123456789");
        assert_eq!(r.rewrite(&once), once);
    }

    #[test]
    fn test_rewrite_with_large_manifest() {
        let mut manifest = RevManifest::new();
        for i in 0..20_000 {
            manifest.insert(format!("assets/images/icon-{}.png", i), format!("assets/images/icon-{}-0123456789.png", i));
        }
        let r = Rewriter::new(manifest).unwrap();
        assert_eq!(
            r.rewrite("url(../assets/images/icon-19999.png) url(../assets/images/icon-7.png)"),
            "url(../assets/images/icon-19999-0123456789.png) url(../assets/images/icon-7-0123456789.png)"
        );
        assert_eq!(r.rewrite("assets/images/icon-7.png.map"), "assets/images/icon-7.png.map");
    }

    #[test]
    fn test_rewrite_finds_key_after_rejected_overlap() {
        let r = rewriter(&[("b.css", "b-2222222222.css"), ("q/b.css", "q/b-1111111111.css")]);
        assert_eq!(r.rewrite("zq/b.css"), "zq/b-2222222222.css");
        assert_eq!(r.rewrite(" q/b.css"), " q/b-1111111111.css");
        assert_eq!(r.rewrite("café b.css"), "café b-2222222222.css");
    }

    #[test]
    fn test_run_skips_manifests_and_other_files() {
        let sink = MemoryOutput::new();
        let mut manifest = RevManifest::new();
        manifest.insert("css/a.css", "css/a-0123456789.css");
        manifest.save(&sink, "css").unwrap();
        sink.write("index.html", br#"<link href="css/a.css">"#).unwrap();
        sink.write("js/app.js", b"load('css/a.css')").unwrap();

        let changed = run(&sink).unwrap();
        assert_eq!(changed, vec!["index.html"]);
        assert_eq!(sink.read("js/app.js").unwrap().unwrap(), b"load('css/a.css')");

        let saved = RevManifest::load(&sink, "rev/css-manifest.json").unwrap().unwrap();
        assert_eq!(saved, manifest);

        // Second run is a no-op
        assert!(run(&sink).unwrap().is_empty());
    }

    #[test]
    fn test_run_without_manifests() {
        let sink = MemoryOutput::new();
        sink.write("index.html", b"<html></html>").unwrap();
        assert!(run(&sink).unwrap().is_empty());
    }
}
