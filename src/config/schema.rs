//! Configuration schema types for `assetpipe.toml`
//!
//! Defines the path table (source globs, filters, output locations) and the
//! settings for each build category, with defaults matching a conventional
//! `src/{js,scss,templates,assets,sprites}` layout.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Extensions copied by the asset task
pub const ASSET_EXTENSIONS: &str = "{jpg,jpeg,gif,png,svg,ttf,eot,woff,woff2}";

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,
    /// Build output directory
    #[serde(default = "default_out")]
    pub out: PathBuf,
}

fn default_out() -> PathBuf {
    PathBuf::from("dist")
}

/// Script category: project scripts plus the common/vendor bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Glob patterns selecting project scripts
    #[serde(default = "default_script_sources")]
    pub sources: Vec<String>,
    /// Patterns removed from the project selection
    #[serde(default = "default_script_exclude")]
    pub exclude: Vec<String>,
    /// Ordered entry points of the vendor bundle
    #[serde(default = "default_script_common")]
    pub common: Vec<String>,
    /// File name of the vendor bundle inside `js/`
    #[serde(default = "default_script_bundle")]
    pub bundle: String,
    /// Compiler command (program followed by arguments); empty uses the built-in compiler
    #[serde(default)]
    pub compiler: Vec<String>,
    /// Minifier command used in production; empty uses the built-in minifier
    #[serde(default)]
    pub minifier: Vec<String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            sources: default_script_sources(),
            exclude: default_script_exclude(),
            common: default_script_common(),
            bundle: default_script_bundle(),
            compiler: Vec::new(),
            minifier: Vec::new(),
        }
    }
}

fn default_script_sources() -> Vec<String> {
    vec!["src/js/**/*.ts".to_string()]
}

fn default_script_exclude() -> Vec<String> {
    vec!["src/js/common/**/*".to_string(), "**/*.d.ts".to_string()]
}

fn default_script_common() -> Vec<String> {
    vec!["src/js/common/vendors.ts".to_string()]
}

fn default_script_bundle() -> String {
    "vendors.js".to_string()
}

/// Browser versions used for vendor prefixing (major versions)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserTargets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firefox: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ie: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safari: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios_saf: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opera: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android: Option<u32>,
}

fn default_targets() -> BrowserTargets {
    BrowserTargets { chrome: Some(21), firefox: Some(28), ie: Some(9), ..Default::default() }
}

/// Style category: project stylesheets plus the common/vendor bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Glob patterns selecting project stylesheets
    #[serde(default = "default_style_sources")]
    pub sources: Vec<String>,
    /// Patterns removed from the project selection
    #[serde(default = "default_style_exclude")]
    pub exclude: Vec<String>,
    /// Ordered entry points of the vendor bundle
    #[serde(default = "default_style_common")]
    pub common: Vec<String>,
    /// File name of the vendor bundle inside `css/`
    #[serde(default = "default_style_bundle")]
    pub bundle: String,
    /// Extra Sass load paths (relative to the project root)
    #[serde(default)]
    pub load_paths: Vec<PathBuf>,
    /// Prefixing targets
    #[serde(default = "default_targets")]
    pub targets: BrowserTargets,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            sources: default_style_sources(),
            exclude: default_style_exclude(),
            common: default_style_common(),
            bundle: default_style_bundle(),
            load_paths: Vec::new(),
            targets: default_targets(),
        }
    }
}

fn default_style_sources() -> Vec<String> {
    vec!["src/scss/**/*.scss".to_string()]
}

fn default_style_exclude() -> Vec<String> {
    vec!["src/scss/common/**/*.scss".to_string()]
}

fn default_style_common() -> Vec<String> {
    vec!["src/scss/common/common.scss".to_string()]
}

fn default_style_bundle() -> String {
    "vendors.css".to_string()
}

/// HTML template category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Glob patterns selecting templates (common ones included, for partials)
    #[serde(default = "default_template_sources")]
    pub sources: Vec<String>,
    /// Patterns for templates used only as partials
    #[serde(default = "default_template_exclude")]
    pub exclude: Vec<String>,
    /// Optional JSON file merged into every template's context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PathBuf>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            sources: default_template_sources(),
            exclude: default_template_exclude(),
            data: None,
        }
    }
}

fn default_template_sources() -> Vec<String> {
    vec!["src/templates/**/*.html".to_string()]
}

fn default_template_exclude() -> Vec<String> {
    vec!["src/templates/common/**/*.html".to_string()]
}

/// Static asset category (images, fonts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_asset_sources")]
    pub sources: Vec<String>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self { sources: default_asset_sources() }
    }
}

fn default_asset_sources() -> Vec<String> {
    vec![format!("src/assets/**/*.{}", ASSET_EXTENSIONS)]
}

/// Sprite sheet generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpritesConfig {
    /// Glob patterns selecting icon PNGs
    #[serde(default = "default_sprite_sources")]
    pub sources: Vec<String>,
    /// Where the packed image is written (a source path, picked up by assets)
    #[serde(default = "default_sprite_image")]
    pub image: PathBuf,
    /// Where the generated SCSS partial is written (picked up by vendor styles)
    #[serde(default = "default_sprite_stylesheet")]
    pub stylesheet: PathBuf,
    /// URL of the packed image as referenced from the generated stylesheet
    #[serde(default = "default_sprite_image_url")]
    pub image_url: String,
    /// Pixels between icons
    #[serde(default = "default_sprite_padding")]
    pub padding: u32,
    /// Class name prefix for generated rules
    #[serde(default = "default_sprite_prefix")]
    pub prefix: String,
}

impl Default for SpritesConfig {
    fn default() -> Self {
        Self {
            sources: default_sprite_sources(),
            image: default_sprite_image(),
            stylesheet: default_sprite_stylesheet(),
            image_url: default_sprite_image_url(),
            padding: default_sprite_padding(),
            prefix: default_sprite_prefix(),
        }
    }
}

fn default_sprite_sources() -> Vec<String> {
    vec!["src/sprites/icons/**/*.png".to_string()]
}

fn default_sprite_image() -> PathBuf {
    PathBuf::from("src/assets/images/icons.png")
}

fn default_sprite_stylesheet() -> PathBuf {
    PathBuf::from("src/scss/common/_/_icons.scss")
}

fn default_sprite_image_url() -> String {
    "../../../assets/images/icons.png".to_string()
}

fn default_sprite_padding() -> u32 {
    10
}

fn default_sprite_prefix() -> String {
    "icon".to_string()
}

/// Development server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Send `Access-Control-Allow-Origin: *` on every response
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), cors: true }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5555
}

fn default_true() -> bool {
    true
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
}

fn default_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// Complete assetpipe.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub styles: StylesConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub sprites: SpritesConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "styles.sources")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "assetpipe.toml: '{}' {}", self.field, self.message)
    }
}

impl PipelineConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.name".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        if self.project.out.as_os_str().is_empty() {
            errors.push(ConfigValidationError {
                field: "project.out".to_string(),
                message: "must be a non-empty path".to_string(),
            });
        }

        let required = [
            ("scripts.sources", &self.scripts.sources),
            ("styles.sources", &self.styles.sources),
            ("templates.sources", &self.templates.sources),
            ("assets.sources", &self.assets.sources),
            ("sprites.sources", &self.sprites.sources),
        ];
        for (field, patterns) in required {
            if patterns.is_empty() {
                errors.push(ConfigValidationError {
                    field: field.to_string(),
                    message: "must contain at least one glob pattern".to_string(),
                });
            }
        }

        for (field, patterns) in self.pattern_lists() {
            for pattern in patterns {
                if let Err(e) = crate::build::discovery::check_pattern(pattern) {
                    errors.push(ConfigValidationError {
                        field: field.to_string(),
                        message: format!("contains an invalid pattern '{}': {}", pattern, e),
                    });
                }
            }
        }

        if self.scripts.bundle.is_empty() || self.styles.bundle.is_empty() {
            errors.push(ConfigValidationError {
                field: "bundle".to_string(),
                message: "vendor bundle names must be non-empty".to_string(),
            });
        }

        if self.sprites.prefix.is_empty() {
            errors.push(ConfigValidationError {
                field: "sprites.prefix".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        if self.server.port == 0 {
            errors.push(ConfigValidationError {
                field: "server.port".to_string(),
                message: "must be a positive port number".to_string(),
            });
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Reject output directories whose removal would delete the project or
    /// any source tree: the project root itself, one of its ancestors, or a
    /// directory containing a source glob's base.
    pub fn validate_output(&self, project_root: &Path) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let root = normalize(project_root);
        let out = normalize(&root.join(&self.project.out));

        if root.starts_with(&out) {
            errors.push(ConfigValidationError {
                field: "project.out".to_string(),
                message: format!("'{}' contains the project root", self.project.out.display()),
            });
            return errors;
        }

        for (field, patterns) in self.source_lists() {
            for pattern in patterns {
                let base = normalize(&root.join(crate::build::discovery::glob_base(pattern)));
                if base.starts_with(&out) {
                    errors.push(ConfigValidationError {
                        field: "project.out".to_string(),
                        message: format!(
                            "'{}' contains sources of {} ('{}')",
                            self.project.out.display(),
                            field,
                            pattern
                        ),
                    });
                }
            }
        }
        errors
    }

    /// Glob lists that select inputs.
    fn source_lists(&self) -> Vec<(&'static str, &Vec<String>)> {
        vec![
            ("scripts.sources", &self.scripts.sources),
            ("scripts.common", &self.scripts.common),
            ("styles.sources", &self.styles.sources),
            ("styles.common", &self.styles.common),
            ("templates.sources", &self.templates.sources),
            ("assets.sources", &self.assets.sources),
            ("sprites.sources", &self.sprites.sources),
        ]
    }

    /// Every glob list in the config, labelled with its field name.
    fn pattern_lists(&self) -> Vec<(&'static str, &Vec<String>)> {
        vec![
            ("scripts.sources", &self.scripts.sources),
            ("scripts.exclude", &self.scripts.exclude),
            ("scripts.common", &self.scripts.common),
            ("styles.sources", &self.styles.sources),
            ("styles.exclude", &self.styles.exclude),
            ("styles.common", &self.styles.common),
            ("templates.sources", &self.templates.sources),
            ("templates.exclude", &self.templates.exclude),
            ("assets.sources", &self.assets.sources),
            ("sprites.sources", &self.sprites.sources),
        ]
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parse() {
        let toml = r#"
[project]
name = "site"
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.project.name, "site");
        assert_eq!(config.project.out, PathBuf::from("dist"));
        assert_eq!(config.scripts.sources, vec!["src/js/**/*.ts"]);
        assert_eq!(config.scripts.common, vec!["src/js/common/vendors.ts"]);
        assert_eq!(config.styles.common, vec!["src/scss/common/common.scss"]);
        assert_eq!(config.sprites.padding, 10);
        assert_eq!(config.server.port, 5555);
        assert!(config.server.cors);
        assert_eq!(config.watch.debounce_ms, 100);
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[project]
name = "shop"
out = "public"

[scripts]
sources = ["web/js/**/*.ts"]
exclude = ["web/js/lib/**/*"]
common = ["web/js/lib/a.js", "web/js/lib/b.js"]
compiler = ["esbuild", "--loader=ts"]
minifier = ["esbuild", "--minify"]

[styles]
sources = ["web/css/**/*.scss"]
common = ["web/css/lib/base.scss"]
load_paths = ["node_modules"]

[styles.targets]
chrome = 90
safari = 14

[templates]
data = "web/data.json"

[sprites]
padding = 4
prefix = "sprite"

[server]
host = "127.0.0.1"
port = 8080
cors = false

[watch]
debounce_ms = 250
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();

        assert_eq!(config.project.out, PathBuf::from("public"));
        assert_eq!(config.scripts.common.len(), 2);
        assert_eq!(config.scripts.compiler, vec!["esbuild", "--loader=ts"]);
        assert_eq!(config.styles.load_paths, vec![PathBuf::from("node_modules")]);
        assert_eq!(config.styles.targets.chrome, Some(90));
        assert_eq!(config.styles.targets.ie, None);
        assert_eq!(config.templates.data, Some(PathBuf::from("web/data.json")));
        assert_eq!(config.sprites.padding, 4);
        assert_eq!(config.sprites.prefix, "sprite");
        assert_eq!(config.server.port, 8080);
        assert!(!config.server.cors);
        assert_eq!(config.watch.debounce_ms, 250);
        assert!(config.is_valid());
    }

    #[test]
    fn test_default_asset_pattern_uses_braces() {
        let assets = AssetsConfig::default();
        assert_eq!(assets.sources, vec!["src/assets/**/*.{jpg,jpeg,gif,png,svg,ttf,eot,woff,woff2}"]);
    }

    #[test]
    fn test_validate_empty_name() {
        let toml = r#"
[project]
name = ""
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "project.name");
    }

    #[test]
    fn test_validate_empty_sources() {
        let toml = r#"
[project]
name = "site"

[styles]
sources = []
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "styles.sources"));
    }

    #[test]
    fn test_validate_bad_pattern() {
        let toml = r#"
[project]
name = "site"

[assets]
sources = ["src/assets/[*.png"]
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "assets.sources"));
    }

    #[test]
    fn test_validate_zero_port() {
        let toml = r#"
[project]
name = "site"

[server]
port = 0
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().iter().any(|e| e.field == "server.port"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ConfigValidationError {
            field: "sprites.prefix".to_string(),
            message: "must be a non-empty string".to_string(),
        };
        assert_eq!(err.to_string(), "assetpipe.toml: 'sprites.prefix' must be a non-empty string");
    }

    fn with_out(out: &str) -> PipelineConfig {
        let mut config: PipelineConfig = toml::from_str("[project]\nname = \"site\"").unwrap();
        config.project.out = PathBuf::from(out);
        config
    }

    #[test]
    fn test_validate_output_rejects_project_root() {
        let root = Path::new("/work/site");
        for out in [".", "", "./", "..", "../..", "/work/site", "/", "dist/.."] {
            let errors = with_out(out).validate_output(root);
            assert_eq!(errors.len(), 1, "out = {:?}", out);
            assert!(errors[0].message.contains("project root"));
        }
    }

    #[test]
    fn test_validate_output_rejects_source_directories() {
        let root = Path::new("/work/site");
        let errors = with_out("src").validate_output(root);
        assert!(errors.iter().any(|e| e.message.contains("scripts.sources")));
        assert!(errors.iter().any(|e| e.message.contains("sprites.sources")));

        let errors = with_out("src/js/").validate_output(root);
        assert!(errors.iter().any(|e| e.message.contains("scripts.common")));
    }

    #[test]
    fn test_validate_output_accepts_separate_directories() {
        let root = Path::new("/work/site");
        for out in ["dist", "./public", "src/dist", "/var/www/site", "../site-dist"] {
            assert!(with_out(out).validate_output(root).is_empty(), "out = {:?}", out);
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/a/b/..")), PathBuf::from("/a"));
    }
}
