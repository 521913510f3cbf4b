//! Script compilation and the vendor script bundle.

use crate::build::{
    discover, select_category, BuildContext, CategoryOutput, OutputFile, SourceFile, TaskError,
};
use crate::tasks::bundle::bundle;
use crate::tasks::tool::run_tool;
use crate::tasks::transpile::{self, transpile};
use rayon::prelude::*;
use std::fs;

/// Output directory for scripts, relative to the output root
pub const SCRIPTS_DIR: &str = "js";

/// Output path for a script: `js/<relative path with .js extension>`.
pub fn output_path(relative: &str) -> String {
    let without_ext = match relative.rfind('.') {
        Some(idx) if idx > relative.rfind('/').map_or(0, |s| s + 1) => &relative[..idx],
        _ => relative,
    };
    format!("{}/{}.js", SCRIPTS_DIR, without_ext)
}

/// Compile one source: the configured compiler command if any, otherwise the
/// built-in TypeScript compiler.
fn compile_file(ctx: &BuildContext, file: &SourceFile) -> Result<Vec<u8>, TaskError> {
    let compiler = &ctx.config().scripts.compiler;
    let source = fs::read(&file.path).map_err(|e| TaskError::io(&file.path, e))?;
    if !compiler.is_empty() {
        return run_tool(compiler, &source, ctx.project_root(), &file.path);
    }
    let source = String::from_utf8(source).map_err(|e| TaskError::Compile {
        path: file.path.clone(),
        message: e.to_string(),
    })?;
    transpile(&file.path, &source).map(String::into_bytes)
}

/// Minify in production, with the configured minifier command if any.
fn finish(
    ctx: &BuildContext,
    code: Vec<u8>,
    file: &SourceFile,
    module: bool,
) -> Result<Vec<u8>, TaskError> {
    if !ctx.is_production() {
        return Ok(code);
    }
    let minifier = &ctx.config().scripts.minifier;
    if !minifier.is_empty() {
        return run_tool(minifier, &code, ctx.project_root(), &file.path);
    }
    let code = String::from_utf8_lossy(&code);
    transpile::minify(&file.path, &code, module).map(String::into_bytes)
}

/// Compile project scripts (common subtree and excluded files removed).
pub fn compile(ctx: &BuildContext) -> Result<CategoryOutput, TaskError> {
    let cfg = &ctx.config().scripts;
    let selection = select_category(ctx.project_root(), &cfg.sources, &cfg.exclude, &cfg.common)?;
    tracing::debug!("js: {} file(s)", selection.main.len());

    let compiled: Vec<_> = selection
        .main
        .par_iter()
        .map(|file| {
            compile_file(ctx, file)
                .and_then(|code| finish(ctx, code, file, true))
                .map(|code| OutputFile::new(output_path(&file.relative), code))
        })
        .collect();

    let mut output = CategoryOutput::new();
    for result in compiled {
        match result {
            Ok(file) => output.push(file),
            Err(e) => output.push_error(e),
        }
    }
    Ok(output)
}

/// Bundle the common entry points, in order, with everything they import.
///
/// A configured compiler command is run over each entry instead and the
/// results concatenated; such a command is expected to bundle by itself.
/// Any failing member leaves the bundle unwritten.
pub fn compile_vendor(ctx: &BuildContext) -> Result<CategoryOutput, TaskError> {
    let cfg = &ctx.config().scripts;
    let files = discover(ctx.project_root(), &cfg.common)?;
    let mut output = CategoryOutput::new();

    let Some(first) = files.first() else {
        tracing::warn!("vendor-js: no files match {:?}", cfg.common);
        return Ok(output);
    };

    let bundled = if cfg.compiler.is_empty() {
        let entries: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        bundle(ctx.project_root(), &entries).map(String::into_bytes)
    } else {
        files
            .iter()
            .map(|file| compile_file(ctx, file))
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(&b'\n'))
    };

    match bundled.and_then(|code| finish(ctx, code, first, false)) {
        Ok(code) => output.push(OutputFile::new(format!("{}/{}", SCRIPTS_DIR, cfg.bundle), code)),
        Err(e) => output.push_error(e),
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildMode;
    use crate::config::default_config;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, contents: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, contents).unwrap();
    }

    #[test]
    fn test_output_path() {
        assert_eq!(output_path("app.ts"), "js/app.js");
        assert_eq!(output_path("pages/home.ts"), "js/pages/home.js");
        assert_eq!(output_path("lib.v2/plain"), "js/lib.v2/plain.js");
    }

    #[test]
    fn test_compile_strips_types_and_excludes_common_and_declarations() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/js/app.ts", "const greeting: string = 'app';\nconsole.log(greeting);\n");
        write(temp.path(), "src/js/types.d.ts", "declare const x: number;");
        write(temp.path(), "src/js/common/vendors.ts", "// vendors");

        let ctx = BuildContext::new(default_config(), temp.path().to_path_buf(), BuildMode::Development);
        let output = compile(&ctx).unwrap();

        assert_eq!(output.files.len(), 1);
        assert_eq!(output.files[0].path, "js/app.js");
        let code = String::from_utf8(output.files[0].contents.clone()).unwrap();
        assert!(code.contains("const greeting ="));
        assert!(!code.contains(": string"));
    }

    #[test]
    fn test_production_output_is_minified() {
        let temp = TempDir::new().unwrap();
        let source = "function greet(name: string): string {\n    return 'hello ' + name;\n}\n\nconsole.log(greet('you'));\n";
        write(temp.path(), "src/js/app.ts", source);

        let dev = BuildContext::new(default_config(), temp.path().to_path_buf(), BuildMode::Development);
        let prod = BuildContext::new(default_config(), temp.path().to_path_buf(), BuildMode::Production);
        let dev_code = compile(&dev).unwrap().files.remove(0).contents;
        let prod_code = compile(&prod).unwrap().files.remove(0).contents;

        assert!(prod_code.len() < dev_code.len());
        assert!(!String::from_utf8(prod_code).unwrap().contains("\n    "));
    }

    #[test]
    fn test_syntax_error_skips_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/js/good.ts", "export const a = 1;");
        write(temp.path(), "src/js/bad.ts", "const = ;");

        let ctx = BuildContext::new(default_config(), temp.path().to_path_buf(), BuildMode::Development);
        let output = compile(&ctx).unwrap();
        assert_eq!(output.files.len(), 1);
        assert_eq!(output.files[0].path, "js/good.js");
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].contains("bad.ts"));
    }

    #[test]
    fn test_vendor_bundle_resolves_imports_in_entry_order() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "lib/b.ts", "import { helper } from './helper';\nhelper();\n");
        write(temp.path(), "lib/helper.ts", "export function helper(): void {}\n");
        write(temp.path(), "lib/a.js", "var a;\n");

        let mut config = default_config();
        config.scripts.common = vec!["lib/b.ts".to_string(), "lib/a.js".to_string()];
        let ctx = BuildContext::new(config, temp.path().to_path_buf(), BuildMode::Development);

        let output = compile_vendor(&ctx).unwrap();
        assert!(output.errors.is_empty());
        assert_eq!(output.files.len(), 1);
        assert_eq!(output.files[0].path, "js/vendors.js");
        let code = String::from_utf8(output.files[0].contents.clone()).unwrap();
        assert!(code.contains("/* lib/helper.ts */"));
        assert!(code.contains("__require(0);\n__require(2);"));
        assert!(!code.contains(": void"));
    }

    #[test]
    fn test_vendor_bundle_with_missing_import_is_not_written() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/js/common/vendors.ts", "import 'no-such-package';\n");

        let ctx = BuildContext::new(default_config(), temp.path().to_path_buf(), BuildMode::Production);
        let output = compile_vendor(&ctx).unwrap();
        assert!(output.files.is_empty());
        assert_eq!(output.errors.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_configured_compiler_overrides_builtin() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "lib/b.js", "var b: number;");
        write(temp.path(), "lib/a.js", "var a;");

        let mut config = default_config();
        config.scripts.common = vec!["lib/b.js".to_string(), "lib/a.js".to_string()];
        config.scripts.compiler = vec!["cat".to_string()];
        let ctx = BuildContext::new(config, temp.path().to_path_buf(), BuildMode::Development);

        let output = compile_vendor(&ctx).unwrap();
        assert_eq!(output.files[0].contents, b"var b: number;\nvar a;");
    }

    #[test]
    fn test_vendor_bundle_without_entries_is_empty() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(default_config(), temp.path().to_path_buf(), BuildMode::Development);
        let output = compile_vendor(&ctx).unwrap();
        assert!(output.files.is_empty());
        assert!(output.errors.is_empty());
    }

    #[test]
    fn test_failing_compiler_skips_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/js/app.ts", "x");

        let mut config = default_config();
        config.scripts.compiler = vec!["assetpipe-no-such-compiler".to_string()];
        let ctx = BuildContext::new(config, temp.path().to_path_buf(), BuildMode::Development);

        let output = compile(&ctx).unwrap();
        assert!(output.files.is_empty());
        assert_eq!(output.errors.len(), 1);
    }
}
