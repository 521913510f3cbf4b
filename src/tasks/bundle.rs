//! Vendor script bundling.
//!
//! Starting from the common entry points, every `import`/`export ... from` and
//! `require("...")` is resolved (relative paths, then `node_modules` packages)
//! and the reachable modules are wrapped into one self-executing script with a
//! small module registry. Module syntax is rewritten in place to CommonJS
//! calls against that registry; everything else is left as compiled.

use crate::build::TaskError;
use crate::tasks::transpile::{source_type, transpile};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, Declaration, ExportDefaultDeclarationKind, Expression, ImportDeclarationSpecifier,
    ModuleExportName, Program, Statement,
};
use oxc_ecmascript::BoundNames;
use oxc_ast::{AstKind, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions tried, in order, for extensionless specifiers
const EXTENSIONS: [&str; 6] = ["ts", "tsx", "js", "mjs", "cjs", "json"];

const RUNTIME: &str = r#"var __cache = {};
function __require(id) {
  if (__cache[id]) return __cache[id].exports;
  if (!__modules[id]) throw new Error("Cannot find module '" + id + "'");
  var module = (__cache[id] = { exports: {} });
  __modules[id].call(module.exports, module, module.exports, __require);
  return module.exports;
}
function __default(m) {
  return m && m.__esModule ? m["default"] : m;
}
function __reexport(target, source) {
  Object.keys(source).forEach(function (key) {
    if (key === "default" || Object.prototype.hasOwnProperty.call(target, key)) return;
    Object.defineProperty(target, key, { enumerable: true, get: function () { return source[key]; } });
  });
}
"#;

/// Bundle `entries` (executed in order) and everything they import.
pub fn bundle(root: &Path, entries: &[PathBuf]) -> Result<String, TaskError> {
    let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let mut bundler = Bundler { root: &root, modules: Vec::new(), ids: HashMap::new() };
    let entry_ids = entries
        .iter()
        .map(|entry| bundler.load(entry))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = String::from("(function () {\nvar __modules = [\n");
    for module in &bundler.modules {
        out.push_str(&format!(
            "/* {} */\nfunction (module, exports, require) {{\n{}\n}},\n",
            module.name, module.body
        ));
    }
    out.push_str("];\n");
    out.push_str(RUNTIME);
    for id in entry_ids {
        out.push_str(&format!("__require({});\n", id));
    }
    out.push_str("})();\n");
    Ok(out)
}

struct Module {
    /// Path relative to the project root, for the bundle comments
    name: String,
    body: String,
}

struct Bundler<'r> {
    root: &'r Path,
    modules: Vec<Module>,
    ids: HashMap<PathBuf, usize>,
}

impl Bundler<'_> {
    fn load(&mut self, path: &Path) -> Result<usize, TaskError> {
        let path = fs::canonicalize(path).map_err(|e| TaskError::io(path, e))?;
        if let Some(&id) = self.ids.get(&path) {
            return Ok(id);
        }

        // Registered before linking so import cycles terminate
        let id = self.modules.len();
        self.ids.insert(path.clone(), id);
        let name = path
            .strip_prefix(self.root)
            .map(crate::build::to_slash)
            .unwrap_or_else(|_| path.display().to_string());
        self.modules.push(Module { name, body: String::new() });

        self.modules[id].body = self.link(&path)?;
        Ok(id)
    }

    /// Compile one module and rewrite its module syntax against the registry.
    fn link(&mut self, path: &Path) -> Result<String, TaskError> {
        let source = fs::read_to_string(path).map_err(|e| TaskError::io(path, e))?;
        if path.extension().is_some_and(|ext| ext == "json") {
            return Ok(format!("module.exports = {};", source.trim()));
        }

        let code = if source_type(path).is_typescript() { transpile(path, &source)? } else { source };
        let allocator = Allocator::default();
        let program = parse(&allocator, path, &code)?;
        let syntax = ModuleSyntax::collect(&program);

        let mut ids = HashMap::new();
        for edit in &syntax.edits {
            for piece in &edit.pieces {
                let Piece::Id { specifier, required } = piece else { continue };
                if ids.contains_key(specifier) {
                    continue;
                }
                match resolve(path, specifier) {
                    Some(dep) => {
                        let id = self.load(&dep)?;
                        ids.insert(specifier.clone(), id);
                    }
                    // Left to fail at runtime, like an unguarded require would
                    None if *required => {
                        tracing::warn!("{}: cannot resolve require('{}')", path.display(), specifier);
                    }
                    None => {
                        return Err(TaskError::Compile {
                            path: path.to_path_buf(),
                            message: format!("cannot resolve import '{}'", specifier),
                        });
                    }
                }
            }
        }

        Ok(syntax.render(&code, &ids))
    }
}

/// Parse as a module, retrying as a classic script for sloppy-mode code.
fn parse<'a>(allocator: &'a Allocator, path: &Path, code: &'a str) -> Result<Program<'a>, TaskError> {
    let module = SourceType::default().with_module(true);
    let parsed = Parser::new(allocator, code, module).parse();
    if !parsed.panicked && parsed.errors.is_empty() {
        return Ok(parsed.program);
    }

    let script = Parser::new(allocator, code, module.with_module(false)).parse();
    if !script.panicked && script.errors.is_empty() {
        return Ok(script.program);
    }
    let message = parsed.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
    Err(TaskError::Compile { path: path.to_path_buf(), message })
}

/// Replacement text: literal code, or the registry id of a dependency.
enum Piece {
    Text(String),
    Id { specifier: String, required: bool },
}

struct Edit {
    start: usize,
    end: usize,
    pieces: Vec<Piece>,
}

impl Edit {
    fn new(start: u32, end: u32, pieces: Vec<Piece>) -> Self {
        Self { start: start as usize, end: end as usize, pieces }
    }

    fn remove(start: u32, end: u32) -> Self {
        Self::new(start, end, Vec::new())
    }
}

/// `var <local> = require(<id>);`
fn require_dependency(local: &str, specifier: &str) -> Vec<Piece> {
    vec![
        Piece::Text(format!("var {} = require(", local)),
        Piece::Id { specifier: specifier.to_string(), required: false },
        Piece::Text(");".to_string()),
    ]
}

fn member(object: &str, name: &str) -> String {
    let is_ident = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if is_ident {
        format!("{}.{}", object, name)
    } else {
        format!("{}[{:?}]", object, name)
    }
}

fn export_name(name: &ModuleExportName) -> String {
    name.name().to_string()
}

fn declared_names(declaration: &Declaration) -> Vec<String> {
    let mut names = Vec::new();
    declaration.bound_names(&mut |ident| names.push(ident.name.to_string()));
    names
}

/// Module syntax found in one compiled file.
#[derive(Default)]
struct ModuleSyntax {
    edits: Vec<Edit>,
    /// Exported name and the expression its getter returns
    exports: Vec<(String, String)>,
    esm: bool,
}

impl ModuleSyntax {
    fn collect(program: &Program) -> Self {
        let mut syntax = ModuleSyntax::default();
        for (index, stmt) in program.body.iter().enumerate() {
            syntax.statement(index, stmt);
        }

        let mut calls = RequireCalls::default();
        calls.visit_program(program);
        for (span, specifier) in calls.calls {
            let id = Piece::Id { specifier, required: true };
            syntax.edits.push(Edit::new(span.start, span.end, vec![id]));
        }

        syntax.edits.sort_by_key(|edit| edit.start);
        syntax
    }

    fn statement(&mut self, index: usize, stmt: &Statement) {
        let local = format!("__dep{}", index);
        match stmt {
            Statement::ImportDeclaration(decl) => {
                self.esm = true;
                let mut pieces = require_dependency(&local, decl.source.value.as_str());
                let specifiers = decl.specifiers.as_ref().map(|s| s.iter()).into_iter().flatten();
                for specifier in specifiers {
                    let binding = match specifier {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            format!(" var {} = __default({});", s.local.name, local)
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            format!(" var {} = {};", s.local.name, local)
                        }
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            let imported = export_name(&s.imported);
                            format!(" var {} = {};", s.local.name, member(&local, &imported))
                        }
                    };
                    pieces.push(Piece::Text(binding));
                }
                self.edits.push(Edit::new(decl.span.start, decl.span.end, pieces));
            }
            Statement::ExportNamedDeclaration(decl) => {
                self.esm = true;
                if let Some(declaration) = &decl.declaration {
                    self.edits.push(Edit::remove(decl.span.start, declaration.span().start));
                    for name in declared_names(declaration) {
                        self.exports.push((name.clone(), name));
                    }
                } else if let Some(source) = &decl.source {
                    let pieces = require_dependency(&local, source.value.as_str());
                    self.edits.push(Edit::new(decl.span.start, decl.span.end, pieces));
                    for spec in &decl.specifiers {
                        let imported = export_name(&spec.local);
                        self.exports.push((export_name(&spec.exported), member(&local, &imported)));
                    }
                } else {
                    self.edits.push(Edit::remove(decl.span.start, decl.span.end));
                    for spec in &decl.specifiers {
                        self.exports.push((export_name(&spec.exported), export_name(&spec.local)));
                    }
                }
            }
            Statement::ExportDefaultDeclaration(decl) => {
                self.esm = true;
                let named = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                        f.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                        c.id.as_ref().map(|id| id.name.to_string())
                    }
                    _ => None,
                };
                let body = decl.declaration.span();
                match named {
                    Some(name) => {
                        self.edits.push(Edit::remove(decl.span.start, body.start));
                        self.exports.push(("default".to_string(), name));
                    }
                    None => {
                        let assign = vec![Piece::Text("exports.default = ".to_string())];
                        self.edits.push(Edit::new(decl.span.start, body.start, assign));
                        // Anonymous declarations become expressions and need a terminator
                        if matches!(
                            decl.declaration,
                            ExportDefaultDeclarationKind::FunctionDeclaration(_)
                                | ExportDefaultDeclarationKind::ClassDeclaration(_)
                        ) {
                            let end = vec![Piece::Text(";".to_string())];
                            self.edits.push(Edit::new(decl.span.end, decl.span.end, end));
                        }
                    }
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                self.esm = true;
                let mut pieces = require_dependency(&local, decl.source.value.as_str());
                match &decl.exported {
                    Some(name) => self.exports.push((export_name(name), local)),
                    None => pieces.push(Piece::Text(format!(" __reexport(exports, {});", local))),
                }
                self.edits.push(Edit::new(decl.span.start, decl.span.end, pieces));
            }
            _ => {}
        }
    }

    /// Apply the edits to `code`, prefixed with the export getters.
    fn render(&self, code: &str, ids: &HashMap<String, usize>) -> String {
        let mut out = String::with_capacity(code.len() + 256);
        if self.esm {
            out.push_str("Object.defineProperty(exports, \"__esModule\", { value: true });\n");
        }
        for (name, value) in &self.exports {
            out.push_str(&format!(
                "Object.defineProperty(exports, {:?}, {{ enumerable: true, get: function () {{ return {}; }} }});\n",
                name, value
            ));
        }

        let mut cursor = 0;
        for edit in &self.edits {
            out.push_str(&code[cursor..edit.start]);
            for piece in &edit.pieces {
                match piece {
                    Piece::Text(text) => out.push_str(text),
                    Piece::Id { specifier, .. } => match ids.get(specifier) {
                        Some(id) => out.push_str(&id.to_string()),
                        None => out.push_str(&format!("{:?}", specifier)),
                    },
                }
            }
            cursor = edit.end;
        }
        out.push_str(&code[cursor..]);
        out
    }
}

/// `require("<literal>")` calls anywhere in a module.
#[derive(Default)]
struct RequireCalls {
    calls: Vec<(Span, String)>,
}

impl<'a> Visit<'a> for RequireCalls {
    fn enter_node(&mut self, kind: AstKind<'a>) {
        let AstKind::CallExpression(call) = kind else {
            return;
        };
        let Expression::Identifier(callee) = &call.callee else {
            return;
        };
        if callee.name.as_str() != "require" || call.arguments.len() != 1 {
            return;
        }
        if let Some(Argument::StringLiteral(literal)) = call.arguments.first() {
            self.calls.push((literal.span, literal.value.to_string()));
        }
    }
}

/// Resolve `specifier` as imported from the file `from`.
pub fn resolve(from: &Path, specifier: &str) -> Option<PathBuf> {
    let dir = from.parent()?;
    if specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
    {
        return resolve_path(&dir.join(specifier));
    }
    if specifier.starts_with('/') {
        return resolve_path(Path::new(specifier));
    }
    resolve_package(dir, specifier)
}

/// `name` or `@scope/name`, optionally followed by a subpath.
fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let skip = if specifier.starts_with('@') { 2 } else { 1 };
    match specifier.match_indices('/').nth(skip - 1) {
        Some((idx, _)) => (&specifier[..idx], Some(&specifier[idx + 1..])),
        None => (specifier, None),
    }
}

fn resolve_package(dir: &Path, specifier: &str) -> Option<PathBuf> {
    let (name, subpath) = split_package(specifier);
    dir.ancestors()
        .map(|ancestor| ancestor.join("node_modules").join(name))
        .filter(|package| package.is_dir())
        .find_map(|package| match subpath {
            Some(sub) => resolve_path(&package.join(sub)),
            None => resolve_path(&package),
        })
}

fn resolve_path(path: &Path) -> Option<PathBuf> {
    resolve_file(path)
        .or_else(|| package_entry(path))
        .or_else(|| resolve_index(path))
}

fn resolve_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    EXTENSIONS.iter().find_map(|ext| {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        candidate.is_file().then_some(candidate)
    })
}

fn resolve_index(dir: &Path) -> Option<PathBuf> {
    EXTENSIONS.iter().map(|ext| dir.join(format!("index.{}", ext))).find(|p| p.is_file())
}

/// The `module` or `main` entry of a package directory.
fn package_entry(dir: &Path) -> Option<PathBuf> {
    let manifest = fs::read_to_string(dir.join("package.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&manifest).ok()?;
    ["module", "main"]
        .iter()
        .filter_map(|field| value.get(field)?.as_str())
        .find_map(|entry| {
            let entry = dir.join(entry);
            resolve_file(&entry).or_else(|| resolve_index(&entry))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, contents: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, contents).unwrap();
    }

    #[test]
    fn test_split_package() {
        assert_eq!(split_package("jquery"), ("jquery", None));
        assert_eq!(split_package("lodash/debounce"), ("lodash", Some("debounce")));
        assert_eq!(split_package("@scope/pkg"), ("@scope/pkg", None));
        assert_eq!(split_package("@scope/pkg/dist/x"), ("@scope/pkg", Some("dist/x")));
    }

    #[test]
    fn test_resolve_relative_with_extensions_and_index() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/js/common/vendors.ts", "");
        write(temp.path(), "src/js/common/util.ts", "");
        write(temp.path(), "src/js/lib/index.js", "");
        let from = temp.path().join("src/js/common/vendors.ts");

        assert_eq!(resolve(&from, "./util"), Some(temp.path().join("src/js/common/util.ts")));
        assert_eq!(resolve(&from, "../lib"), Some(temp.path().join("src/js/common/../lib/index.js")));
        assert_eq!(resolve(&from, "./missing"), None);
    }

    #[test]
    fn test_resolve_package_main_and_subpath() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/vendors.ts", "");
        write(temp.path(), "node_modules/widget/package.json", r#"{"main": "dist/widget.js"}"#);
        write(temp.path(), "node_modules/widget/dist/widget.js", "");
        write(temp.path(), "node_modules/widget/extra.js", "");
        let from = temp.path().join("src/vendors.ts");

        let main = resolve(&from, "widget").unwrap();
        assert!(main.ends_with("node_modules/widget/dist/widget.js"));
        let sub = resolve(&from, "widget/extra").unwrap();
        assert!(sub.ends_with("node_modules/widget/extra.js"));
        assert_eq!(resolve(&from, "not-installed"), None);
    }

    #[test]
    fn test_bundle_inlines_imports_once() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "src/vendors.ts",
            "import greet, { shout as loud } from './greet';\nimport './side';\nimport './side';\nconsole.log(greet('a'), loud('b'));\n",
        );
        write(
            temp.path(),
            "src/greet.ts",
            "export default function greet(name: string): string { return 'hi ' + name; }\nexport const shout = (s: string) => s.toUpperCase();\n",
        );
        write(temp.path(), "src/side.js", "window.sideLoaded = true;\n");

        let out = bundle(temp.path(), &[temp.path().join("src/vendors.ts")]).unwrap();

        assert!(out.starts_with("(function () {"));
        assert!(out.contains("/* src/vendors.ts */"));
        assert!(out.contains("/* src/greet.ts */"));
        assert_eq!(out.matches("/* src/side.js */").count(), 1);
        assert!(out.contains("var __dep0 = require(1); var greet = __default(__dep0); var loud = __dep0.shout;"));
        assert!(out.contains("get: function () { return greet; }"));
        assert!(out.contains("get: function () { return shout; }"));
        assert!(!out.contains("import "));
        assert!(!out.contains("export "));
        assert!(!out.contains(": string"));
        assert!(out.trim_end().ends_with("__require(0);\n})();"));
    }

    #[test]
    fn test_bundle_rewrites_require_of_packages() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/vendors.js", "var w = require('widget');\nw.init();\n");
        write(temp.path(), "node_modules/widget/index.js", "module.exports = { init: function () {} };\n");

        let out = bundle(temp.path(), &[temp.path().join("src/vendors.js")]).unwrap();
        assert!(out.contains("var w = require(1);"));
        assert!(out.contains("/* node_modules/widget/index.js */"));
    }

    #[test]
    fn test_bundle_runs_entries_in_order() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b.js", "var b = 1;\n");
        write(temp.path(), "a.js", "var a = 1;\n");

        let out = bundle(temp.path(), &[temp.path().join("b.js"), temp.path().join("a.js")]).unwrap();
        let b = out.find("/* b.js */").unwrap();
        let a = out.find("/* a.js */").unwrap();
        assert!(b < a);
        assert!(out.contains("__require(0);\n__require(1);\n"));
    }

    #[test]
    fn test_bundle_reexports() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "index.js", "export * from './a';\nexport { b as c } from './b';\nexport * as ns from './a';\n");
        write(temp.path(), "a.js", "export const a = 1;\n");
        write(temp.path(), "b.js", "const b = 2;\nexport { b };\nexport default 3;\n");

        let out = bundle(temp.path(), &[temp.path().join("index.js")]).unwrap();
        assert!(out.contains("__reexport(exports, __dep0);"));
        assert!(out.contains("return __dep1.b;"));
        assert!(out.contains("Object.defineProperty(exports, \"ns\""));
        assert!(out.contains("exports.default = 3;"));
    }

    #[test]
    fn test_unresolved_import_is_compile_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "entry.ts", "import x from 'not-installed';\nconsole.log(x);\n");

        let err = bundle(temp.path(), &[temp.path().join("entry.ts")]).unwrap_err();
        assert!(matches!(err, TaskError::Compile { .. }));
        assert!(err.to_string().contains("not-installed"));
    }

    #[test]
    fn test_unresolved_require_is_left_for_runtime() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "entry.js", "if (typeof window === 'undefined') { require('fs'); }\n");

        let out = bundle(temp.path(), &[temp.path().join("entry.js")]).unwrap();
        assert!(out.contains("require(\"fs\")"));
    }

    #[test]
    fn test_json_modules() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "entry.js", "var data = require('./data.json');\n");
        write(temp.path(), "data.json", "{\"a\": 1}\n");

        let out = bundle(temp.path(), &[temp.path().join("entry.js")]).unwrap();
        assert!(out.contains("module.exports = {\"a\": 1};"));
    }
}
