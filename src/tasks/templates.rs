//! HTML template rendering with `handlebars`.
//!
//! Every template (common ones included) is registered under its relative
//! name without extension, so `{{> common/header}}` works. Common templates
//! are also registered under their file stem (`{{> header}}`). Only the
//! non-common templates are rendered to the output root.

use crate::build::{
    select_category, BuildContext, CategoryOutput, OutputFile, SourceFile, TaskError,
};
use handlebars::Handlebars;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;

/// Name a template is registered under: relative path without extension.
pub fn template_name(relative: &str) -> &str {
    match relative.rfind('.') {
        Some(idx) if idx > relative.rfind('/').map_or(0, |s| s + 1) => &relative[..idx],
        _ => relative,
    }
}

/// Output path for a rendered template: `<relative path>.html`.
pub fn output_path(relative: &str) -> String {
    format!("{}.html", template_name(relative))
}

/// Render context: the optional data file plus a `production` flag.
pub fn render_context(ctx: &BuildContext) -> Result<Value, TaskError> {
    let mut context = match &ctx.config().templates.data {
        Some(path) => {
            let path = ctx.resolve_path(path);
            let text = fs::read_to_string(&path).map_err(|e| TaskError::io(&path, e))?;
            match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(TaskError::Template {
                        name: path.display().to_string(),
                        message: "data file must contain a JSON object".to_string(),
                    })
                }
                Err(e) => {
                    return Err(TaskError::Template {
                        name: path.display().to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }
        None => Map::new(),
    };
    context.insert("production".to_string(), Value::Bool(ctx.is_production()));
    Ok(Value::Object(context))
}

fn register(
    registry: &mut Handlebars<'_>,
    name: &str,
    file: &SourceFile,
) -> Result<(), TaskError> {
    let source = fs::read_to_string(&file.path).map_err(|e| TaskError::io(&file.path, e))?;
    registry.register_template_string(name, source).map_err(|e| TaskError::Template {
        name: file.project_path.clone(),
        message: e.to_string(),
    })
}

/// Render every non-common template.
pub fn compile(ctx: &BuildContext) -> Result<CategoryOutput, TaskError> {
    let cfg = &ctx.config().templates;
    // Common templates are the excluded ones; there is no separate bundle
    let selection = select_category(ctx.project_root(), &cfg.sources, &[], &[])?;
    let excluded = crate::build::PatternSet::new(&cfg.exclude)?;
    let data = render_context(ctx)?;

    let mut output = CategoryOutput::new();
    let mut registry = Handlebars::new();
    let mut failed = HashSet::new();

    let (partials, pages): (Vec<&SourceFile>, Vec<&SourceFile>) =
        selection.main.iter().partition(|f| excluded.matches(&f.project_path));

    for file in &partials {
        let name = template_name(&file.relative);
        if let Err(e) = register(&mut registry, name, file) {
            output.push_error(e);
            continue;
        }
        let stem = file.stem();
        if stem != name && !registry.has_template(stem) {
            if let Err(e) = register(&mut registry, stem, file) {
                output.push_error(e);
            }
        }
    }

    for file in &pages {
        if let Err(e) = register(&mut registry, template_name(&file.relative), file) {
            output.push_error(e);
            failed.insert(file.project_path.clone());
        }
    }

    for file in pages.iter().filter(|f| !failed.contains(&f.project_path)) {
        let name = template_name(&file.relative);
        match registry.render(name, &data) {
            Ok(html) => output.push(OutputFile::new(output_path(&file.relative), html)),
            Err(e) => output.push_error(TaskError::Template {
                name: file.project_path.clone(),
                message: e.to_string(),
            }),
        }
    }

    tracing::debug!("templates: {} rendered, {} partial(s)", output.files.len(), partials.len());
    Ok(output)
}
