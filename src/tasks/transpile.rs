//! In-process script compilation with oxc.
//!
//! TypeScript sources are parsed, stripped of type syntax and printed back as
//! JavaScript. Production output is compressed and printed without
//! whitespace. Syntax and transform errors become [`TaskError::Compile`].

use crate::build::TaskError;
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};
use std::path::Path;

/// Source type for `path`; unknown extensions parse as JavaScript modules.
pub fn source_type(path: &Path) -> SourceType {
    SourceType::from_path(path).unwrap_or_default()
}

fn compile_error(path: &Path, errors: impl IntoIterator<Item = impl ToString>) -> TaskError {
    let message = errors.into_iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
    TaskError::Compile { path: path.to_path_buf(), message }
}

/// Compile one script to JavaScript. `path` selects TypeScript or JavaScript
/// parsing by extension.
pub fn transpile(path: &Path, source: &str) -> Result<String, TaskError> {
    let source_type = source_type(path);
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, source_type).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return Err(compile_error(path, parsed.errors));
    }
    let mut program = parsed.program;

    let semantic = SemanticBuilder::new().build(&program);
    if !semantic.errors.is_empty() {
        return Err(compile_error(path, semantic.errors));
    }
    let (symbols, scopes) = semantic.semantic.into_symbol_table_and_scope_tree();

    let transformed = Transformer::new(&allocator, path, &TransformOptions::default())
        .build_with_symbols_and_scopes(symbols, scopes, &mut program);
    if !transformed.errors.is_empty() {
        return Err(compile_error(path, transformed.errors));
    }

    Ok(Codegen::new().build(&program).code)
}

/// Compress and print `source` (plain JavaScript) without whitespace.
///
/// Bundles are scripts, not modules, so `module` controls how the source is
/// parsed.
pub fn minify(path: &Path, source: &str, module: bool) -> Result<String, TaskError> {
    let source_type = SourceType::default().with_module(module);
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, source_type).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return Err(compile_error(path, parsed.errors));
    }
    let mut program = parsed.program;

    Minifier::new(MinifierOptions::default()).build(&allocator, &mut program);

    let options = CodegenOptions { minify: true, ..CodegenOptions::default() };
    Ok(Codegen::new().with_options(options).build(&program).code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_type_annotations() {
        let code = transpile(
            Path::new("app.ts"),
            "interface Point { x: number }\nconst x: number = 1;\nexport function f(p: Point): number { return p.x + x; }\n",
        )
        .unwrap();
        assert!(!code.contains("interface"));
        assert!(!code.contains(": number"));
        assert!(code.contains("const x = 1"));
        assert!(code.contains("export function f(p)"));
    }

    #[test]
    fn test_type_only_imports_are_dropped() {
        let code = transpile(
            Path::new("app.ts"),
            "import type { Point } from './point';\nlet p: Point | null = null;\nconsole.log(p);\n",
        )
        .unwrap();
        assert!(!code.contains("./point"));
        assert!(code.contains("console.log(p)"));
    }

    #[test]
    fn test_javascript_keeps_its_statements() {
        let code = transpile(Path::new("plain.js"), "var a = 1;\nconsole.log(a);\n").unwrap();
        assert!(code.contains("var a = 1"));
        assert!(code.contains("console.log(a)"));
    }

    #[test]
    fn test_syntax_error_is_compile_error() {
        let err = transpile(Path::new("src/js/broken.ts"), "const = ;").unwrap_err();
        assert!(matches!(err, TaskError::Compile { .. }));
        assert!(err.to_string().contains("src/js/broken.ts"));
    }

    #[test]
    fn test_minify_removes_whitespace() {
        let source = "function greet(name) {\n    return 'hello ' + name;\n}\n\nconsole.log(greet('a'));\n";
        let code = minify(Path::new("app.js"), source, true).unwrap();
        assert!(code.len() < source.len());
        assert!(!code.contains("\n    "));
        assert!(code.contains("console.log"));
    }

    #[test]
    fn test_minify_reports_syntax_errors() {
        let err = minify(Path::new("app.js"), "function (", false).unwrap_err();
        assert!(matches!(err, TaskError::Compile { .. }));
    }
}
