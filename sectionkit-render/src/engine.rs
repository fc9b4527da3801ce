//! Tera-based renderer with the `section` and `schema` directives.
//!
//! Template source goes through [`directive::scan`] before Tera sees it.
//! Schema blocks are gone at that point, and every `section` tag has been
//! lowered into a call to a Tera function that recurses back into
//! [`SiteRenderer`].

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sectionkit_core::directive::{self, validate_section_name, DirectiveError, Segment};
use sectionkit_core::{Config, SectionSettings};
use serde::Serialize;
use tera::{Context, Tera, Value};
use walkdir::{DirEntry, WalkDir};

use super::filters;

/// Tera function lowered `section` directives call
const SECTION_FUNCTION: &str = "include_section";

/// Everything a render needs, built once per build and shared by every
/// nested section render.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Directories searched, in order, for a bare template name
    pub search_paths: Vec<PathBuf>,
    pub sections_dir: PathBuf,
    /// Suffix appended to bare template and section names
    pub extension: String,
    pub settings: Arc<SectionSettings>,
    pub max_section_depth: usize,
}

impl RenderConfig {
    pub fn from_config(config: &Config, settings: SectionSettings) -> Self {
        Self {
            search_paths: config.search_paths(),
            sections_dir: config.sections_dir(),
            extension: config.extension.clone(),
            settings: Arc::new(settings),
            max_section_depth: config.max_section_depth,
        }
    }
}

/// The `section` variable visible inside a section template
#[derive(Debug, Serialize)]
pub struct SectionObject<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub section_type: &'a str,
    pub settings: &'a SectionSettings,
}

/// Variables visible to a template. Empty for the root template.
#[derive(Debug, Default)]
pub struct Scope<'a> {
    section: Option<SectionObject<'a>>,
}

impl<'a> Scope<'a> {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn section(section: SectionObject<'a>) -> Self {
        Self {
            section: Some(section),
        }
    }

    fn to_context(&self) -> Context {
        let mut context = Context::new();
        if let Some(section) = &self.section {
            context.insert("section", section);
        }
        context
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template '{name}' not found in {searched:?}")]
    TemplateNotFound { name: String, searched: Vec<PathBuf> },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path:?}: {source}")]
    Directive {
        path: PathBuf,
        source: DirectiveError,
    },

    #[error("render error for '{template}': {source}")]
    Template {
        template: String,
        source: tera::Error,
    },

    #[error("failed to walk {path:?}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("invalid section name '{name}': {reason}")]
    InvalidSectionName { name: String, reason: String },

    #[error("section '{name}' exceeds the maximum nesting depth of {limit}")]
    SectionDepthExceeded { name: String, limit: usize },
}

/// Renders templates from disk. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SiteRenderer {
    config: Arc<RenderConfig>,
}

impl SiteRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Find `name` in the search path, appending the extension unless the
    /// name already carries it.
    pub fn resolve_template(&self, name: &str) -> Result<PathBuf, RenderError> {
        let file_name = if name.ends_with(&self.config.extension) {
            name.to_string()
        } else {
            format!("{}{}", name, self.config.extension)
        };

        self.config
            .search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
            .ok_or_else(|| RenderError::TemplateNotFound {
                name: file_name,
                searched: self.config.search_paths.clone(),
            })
    }

    /// Render a template by name with the given scope
    pub fn render_file(&self, name: &str, scope: &Scope<'_>) -> Result<String, RenderError> {
        let path = self.resolve_template(name)?;
        tracing::debug!("Rendering {:?}", path);
        self.render_path(&path, scope, 0)
    }

    /// Expand a `section` directive: the rendered section file, or an HTML
    /// comment when the file does not exist.
    pub fn render_section(&self, name: &str) -> Result<String, RenderError> {
        self.render_section_at(name, 1)
    }

    fn render_section_at(&self, name: &str, depth: usize) -> Result<String, RenderError> {
        validate_section_name(name).map_err(|reason| RenderError::InvalidSectionName {
            name: name.to_string(),
            reason,
        })?;

        let path = self
            .config
            .sections_dir
            .join(format!("{}{}", name, self.config.extension));
        if !path.is_file() {
            tracing::warn!("Section '{}' not found at {:?}", name, path);
            return Ok(missing_section_marker(name));
        }

        if depth > self.config.max_section_depth {
            return Err(RenderError::SectionDepthExceeded {
                name: name.to_string(),
                limit: self.config.max_section_depth,
            });
        }

        let section = SectionObject {
            id: name,
            section_type: name,
            settings: &self.config.settings,
        };

        tracing::debug!("Rendering section '{}' (depth {})", name, depth);
        self.render_path(&path, &Scope::section(section), depth)
    }

    fn render_path(
        &self,
        path: &Path,
        scope: &Scope<'_>,
        depth: usize,
    ) -> Result<String, RenderError> {
        let template = path.display().to_string();
        let lowered = load_template(path)?;

        let mut templates = self.search_path_templates()?;
        templates.push((template.clone(), lowered));

        let mut tera = self.engine(depth);
        tera.add_raw_templates(templates)
            .map_err(|source| RenderError::Template {
                template: template.clone(),
                source,
            })?;

        tera.render(&template, &scope.to_context())
            .map_err(|source| RenderError::Template { template, source })
    }

    /// Every template under the search path, keyed by its path relative to
    /// the directory it was found in, so `include`, `extends` and `import`
    /// can reach siblings. Earlier directories shadow later ones.
    fn search_path_templates(&self) -> Result<Vec<(String, String)>, RenderError> {
        let mut seen = HashSet::new();
        let mut templates = Vec::new();

        for dir in self.config.search_paths.iter().filter(|dir| dir.is_dir()) {
            let walker = WalkDir::new(dir)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

            for entry in walker {
                let entry = entry.map_err(|source| RenderError::Walk {
                    path: dir.clone(),
                    source,
                })?;
                if !entry.file_type().is_file()
                    || !entry
                        .file_name()
                        .to_string_lossy()
                        .ends_with(&self.config.extension)
                {
                    continue;
                }

                let path = entry.path();
                let name = template_name(path.strip_prefix(dir).unwrap_or(path));
                if seen.insert(name.clone()) {
                    templates.push((name, load_template(path)?));
                }
            }
        }

        Ok(templates)
    }

    /// A fresh engine per render, so every render re-reads and re-parses
    /// the whole search path.
    fn engine(&self, depth: usize) -> Tera {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);

        tera.register_filter("asset_url", filters::asset_url);
        tera.register_filter("stylesheet_tag", filters::stylesheet_tag);

        let renderer = self.clone();
        tera.register_function(
            SECTION_FUNCTION,
            move |args: &HashMap<String, Value>| -> tera::Result<Value> {
                let name = args.get("name").and_then(Value::as_str).ok_or_else(|| {
                    tera::Error::msg("include_section expects a string `name` argument")
                })?;

                renderer
                    .render_section_at(name, depth + 1)
                    .map(Value::String)
                    .map_err(|err| {
                        tera::Error::chain(format!("Failed to render section '{}'", name), err)
                    })
            },
        );

        tera
    }
}

/// Read a template and resolve its directives into plain Tera source
fn load_template(path: &Path) -> Result<String, RenderError> {
    let source = fs::read_to_string(path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let segments = directive::scan(&source).map_err(|source| RenderError::Directive {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(lower(&segments))
}

/// `/`-separated name a template is registered under
fn template_name(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Placeholder emitted for a section whose file does not exist
pub fn missing_section_marker(name: &str) -> String {
    format!("<!-- section '{}' not found -->", name)
}

/// Turn scanned segments back into Tera source, replacing each section
/// directive with a function call.
fn lower(segments: &[Segment<'_>]) -> String {
    let mut out = String::new();

    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Section(section) => {
                out.push_str(if section.trim_before { "{{- " } else { "{{ " });
                // Names are validated by the scanner and never contain quotes
                out.push_str(&format!("{}(name=\"{}\")", SECTION_FUNCTION, section.name));
                out.push_str(if section.trim_after { " -}}" } else { " }}" });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("templates")).unwrap();
            fs::create_dir_all(dir.path().join("sections")).unwrap();
            Self { dir }
        }

        fn template(&self, name: &str, content: &str) -> &Self {
            fs::write(self.dir.path().join("templates").join(name), content).unwrap();
            self
        }

        fn section(&self, name: &str, content: &str) -> &Self {
            fs::write(self.dir.path().join("sections").join(name), content).unwrap();
            self
        }

        fn config(&self) -> Config {
            Config::for_root(self.dir.path())
        }

        fn renderer(&self) -> SiteRenderer {
            SiteRenderer::new(RenderConfig::from_config(
                &self.config(),
                SectionSettings::defaults(),
            ))
        }

        fn render(&self, name: &str) -> Result<String, RenderError> {
            self.renderer().render_file(name, &Scope::root())
        }
    }

    fn error_chain(err: &dyn Error) -> String {
        let mut messages = vec![err.to_string()];
        let mut current = err.source();
        while let Some(source) = current {
            messages.push(source.to_string());
            current = source.source();
        }
        messages.join(" | ")
    }

    #[test]
    fn test_section_id_is_section_name() {
        let fixture = Fixture::new();
        fixture
            .template("page.liquid", "{% section 'hero' %}")
            .section("hero.liquid", "{{ section.id }}");

        assert_eq!(fixture.render("page").unwrap(), "hero");
    }

    #[test]
    fn test_section_object_fields() {
        let fixture = Fixture::new();
        fixture.template("page.liquid", "{% section 'drip' %}").section(
            "drip.liquid",
            "{{ section.type }}|{{ section.settings.bg_color }}|{{ section.settings.anim_duration }}|{{ section.settings.show_droplet }}",
        );

        assert_eq!(fixture.render("page").unwrap(), "drip|#ffffff|2|true");
    }

    #[test]
    fn test_section_uses_loaded_settings() {
        let fixture = Fixture::new();
        fixture
            .template("page.liquid", "{% section \"drip\" %}")
            .section("drip.liquid", "{{ section.settings.bg_color }}");

        let settings = SectionSettings::from_json_str(r##"{"bg_color": "#123456"}"##).unwrap();
        let renderer = SiteRenderer::new(RenderConfig::from_config(&fixture.config(), settings));

        assert_eq!(
            renderer.render_file("page", &Scope::root()).unwrap(),
            "#123456"
        );
    }

    #[test]
    fn test_missing_section_renders_comment() {
        let fixture = Fixture::new();
        fixture.template("page.liquid", "<p>{% section 'missing_name' %}</p>");

        assert_eq!(
            fixture.render("page").unwrap(),
            "<p><!-- section 'missing_name' not found --></p>"
        );
    }

    #[test]
    fn test_schema_block_contributes_nothing() {
        let fixture = Fixture::new();
        fixture.template(
            "page.liquid",
            r#"<div>{% schema %}{"a":1}{% endschema %}</div>"#,
        );

        let html = fixture.render("page").unwrap();
        assert_eq!(html, "<div></div>");
        assert!(!html.contains(r#"{"a":1}"#));
    }

    #[test]
    fn test_schema_body_is_never_parsed() {
        let fixture = Fixture::new();
        fixture
            .template("page.liquid", "{% section 'hero' %}")
            .section(
                "hero.liquid",
                "<h1>{{ section.id }}</h1>\n{% schema %}\n{\"name\": \"{{ broken\", \"x\": \"{% if %}\"}\n{% endschema %}",
            );

        assert_eq!(fixture.render("page").unwrap(), "<h1>hero</h1>\n");
    }

    #[test]
    fn test_filters_render_unescaped() {
        let fixture = Fixture::new();
        fixture.template(
            "page.liquid",
            "{{ 'style.css' | asset_url | stylesheet_tag }}",
        );

        assert_eq!(
            fixture.render("page").unwrap(),
            r#"<link rel="stylesheet" href="style.css">"#
        );
    }

    #[test]
    fn test_nested_sections_get_their_own_scope() {
        let fixture = Fixture::new();
        fixture
            .template("page.liquid", "{% section 'outer' %}")
            .section(
                "outer.liquid",
                "{{ section.id }}[{% section 'inner' %}]{{ section.id }}",
            )
            .section("inner.liquid", "{{ section.id }}");

        assert_eq!(fixture.render("page").unwrap(), "outer[inner]outer");
    }

    #[test]
    fn test_root_template_has_no_section_variable() {
        let fixture = Fixture::new();
        fixture.template("page.liquid", "{{ section.id }}");

        assert!(matches!(
            fixture.render("page"),
            Err(RenderError::Template { .. })
        ));
    }

    #[test]
    fn test_self_including_section_hits_depth_limit() {
        let fixture = Fixture::new();
        fixture
            .template("page.liquid", "{% section 'loop' %}")
            .section("loop.liquid", "x{% section 'loop' %}");

        let mut config = RenderConfig::from_config(&fixture.config(), SectionSettings::defaults());
        config.max_section_depth = 3;
        let renderer = SiteRenderer::new(config);

        let err = renderer.render_file("page", &Scope::root()).unwrap_err();
        let chain = error_chain(&err);
        assert!(
            chain.contains("section 'loop' exceeds the maximum nesting depth of 3"),
            "unexpected error chain: {}",
            chain
        );
    }

    #[test]
    fn test_render_section_directly() {
        let fixture = Fixture::new();
        fixture.section("hero.liquid", "<h1>{{ section.type }}</h1>");
        let renderer = fixture.renderer();

        assert_eq!(renderer.render_section("hero").unwrap(), "<h1>hero</h1>");
        assert_eq!(
            renderer.render_section("nope").unwrap(),
            missing_section_marker("nope")
        );
        assert!(matches!(
            renderer.render_section("../escape"),
            Err(RenderError::InvalidSectionName { .. })
        ));
    }

    #[test]
    fn test_search_path_order_and_extension() {
        let fixture = Fixture::new();
        fixture
            .template("page.drip.liquid", "from templates")
            .section("card.liquid", "from sections");
        fs::write(fixture.dir.path().join("page.drip.liquid"), "from root").unwrap();
        fs::write(fixture.dir.path().join("footer.liquid"), "from root").unwrap();

        assert_eq!(fixture.render("page.drip.liquid").unwrap(), "from templates");
        assert_eq!(fixture.render("page.drip").unwrap(), "from templates");
        assert_eq!(fixture.render("card").unwrap(), "from sections");
        assert_eq!(fixture.render("footer").unwrap(), "from root");
    }

    #[test]
    fn test_unknown_template() {
        let fixture = Fixture::new();
        match fixture.render("nowhere") {
            Err(RenderError::TemplateNotFound { name, searched }) => {
                assert_eq!(name, "nowhere.liquid");
                assert_eq!(searched.len(), 3);
            }
            other => panic!("expected TemplateNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        let fixture = Fixture::new();
        fixture.template("page.liquid", "<p>{{ unclosed </p>");

        assert!(matches!(
            fixture.render("page"),
            Err(RenderError::Template { .. })
        ));
    }

    #[test]
    fn test_malformed_directive_is_fatal() {
        let fixture = Fixture::new();
        fixture.template("page.liquid", "{% section hero %}");

        assert!(matches!(
            fixture.render("page"),
            Err(RenderError::Directive {
                source: DirectiveError::InvalidSectionArgument { line: 1, .. },
                ..
            })
        ));
    }

    #[test]
    fn test_section_whitespace_control() {
        let fixture = Fixture::new();
        fixture
            .template("page.liquid", "<a>\n  {%- section 'hero' -%}\n</a>")
            .section("hero.liquid", "hero");

        assert_eq!(fixture.render("page").unwrap(), "<a>hero</a>");
    }

    #[test]
    fn test_raw_block_keeps_directives_literal() {
        let fixture = Fixture::new();
        fixture.template("page.liquid", "{% raw %}{% section 'hero' %}{% endraw %}");

        assert_eq!(fixture.render("page").unwrap(), "{% section 'hero' %}");
    }

    #[test]
    fn test_edits_are_picked_up_between_renders() {
        let fixture = Fixture::new();
        fixture
            .template("page.liquid", "{% section 'hero' %}")
            .section("hero.liquid", "first");
        let renderer = fixture.renderer();

        assert_eq!(renderer.render_file("page", &Scope::root()).unwrap(), "first");
        fixture.section("hero.liquid", "second");
        assert_eq!(renderer.render_file("page", &Scope::root()).unwrap(), "second");
    }

    #[test]
    fn test_include_from_templates_and_root() {
        let fixture = Fixture::new();
        fixture
            .template("layout.liquid", "<head/>")
            .template(
                "page.liquid",
                r#"{% include "layout.liquid" %}<body/>{% include "footer.liquid" %}"#,
            );
        fs::write(fixture.dir.path().join("footer.liquid"), "<footer/>").unwrap();

        assert_eq!(fixture.render("page").unwrap(), "<head/><body/><footer/>");
    }

    #[test]
    fn test_included_template_resolves_sections() {
        let fixture = Fixture::new();
        fixture
            .template("partial.liquid", "[{% section 'hero' %}]")
            .template("page.liquid", r#"{% include "partial.liquid" %}"#)
            .section("hero.liquid", "{{ section.id }}");

        assert_eq!(fixture.render("page").unwrap(), "[hero]");
    }

    #[test]
    fn test_extends_layout() {
        let fixture = Fixture::new();
        fixture
            .template(
                "base.liquid",
                "<html>{% block body %}{% endblock body %}</html>",
            )
            .template(
                "page.liquid",
                r#"{% extends "base.liquid" %}{% block body %}{% section 'hero' %}{% endblock body %}"#,
            )
            .section("hero.liquid", "hero");

        assert_eq!(fixture.render("page").unwrap(), "<html>hero</html>");
    }

    #[test]
    fn test_earlier_search_directory_shadows_later() {
        let fixture = Fixture::new();
        fixture
            .template("shared.liquid", "templates")
            .template("page.liquid", r#"{% include "shared.liquid" %}"#);
        fs::write(fixture.dir.path().join("shared.liquid"), "root").unwrap();

        assert_eq!(fixture.render("page").unwrap(), "templates");
    }

    #[test]
    fn test_nested_template_names_use_slashes() {
        let fixture = Fixture::new();
        fs::create_dir_all(fixture.dir.path().join("templates/partials")).unwrap();
        fixture
            .template("partials/nav.liquid", "<nav/>")
            .template("page.liquid", r#"{% include "partials/nav.liquid" %}"#);

        assert_eq!(fixture.render("page").unwrap(), "<nav/>");
    }

    #[test]
    fn test_commented_out_directives_render_nothing() {
        let fixture = Fixture::new();
        fixture.template(
            "page.liquid",
            "{# old: {% schema %} #}{# {% section 'todo later' %} #}ok",
        );

        assert_eq!(fixture.render("page").unwrap(), "ok");
    }

    #[test]
    fn test_template_name() {
        assert_eq!(template_name(Path::new("partials/nav.liquid")), "partials/nav.liquid");
        assert_eq!(template_name(Path::new("page.liquid")), "page.liquid");
    }

    #[test]
    fn test_lower_section_call() {
        let segments = directive::scan("a{% section 'hero' %}b").unwrap();
        assert_eq!(
            lower(&segments),
            "a{{ include_section(name=\"hero\") }}b"
        );
    }
}
