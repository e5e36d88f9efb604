use std::{
    borrow::Cow,
    fs, io,
    path::{Component, Path, PathBuf},
};

use glob::{glob, Pattern};
use liquid::{
    partials::{LazyCompiler, PartialSource},
    ParserBuilder,
};
use serde_json::{Map, Value};
use tracing::debug;

use self::scan::scan;

mod scan;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("invalid template path '{0}', expected a relative path inside a template root")]
    InvalidPath(String),
    #[error("template '{name}' not found in {}{}", list_roots(.searched), list_available(.available))]
    NotFound {
        name: String,
        searched: Vec<PathBuf>,
        available: Vec<String>,
    },
    #[error("failed to read template {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("template include cycle: {}", .0.join(" -> "))]
    IncludeCycle(Vec<String>),
    #[error("template data must be a JSON object, got {0}")]
    Context(&'static str),
    #[error("template syntax error: {0}")]
    Syntax(#[source] liquid::Error),
    #[error("template rendering failed: {0}")]
    Render(#[source] liquid::Error),
}

fn list_roots(roots: &[PathBuf]) -> String {
    roots
        .iter()
        .map(|r| format!("'{}'", r.display()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn list_available(available: &[String]) -> String {
    if available.is_empty() {
        String::new()
    } else {
        format!(" (built-in templates: {})", available.join(", "))
    }
}

/// Ordered template roots. The built-in directory is searched before the
/// workspace, and the first root containing the file wins.
#[derive(Debug, Clone)]
pub struct SearchPath {
    builtin: PathBuf,
    workspace: PathBuf,
}

impl SearchPath {
    pub fn new(builtin: impl Into<PathBuf>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            builtin: builtin.into(),
            workspace: workspace.into(),
        }
    }

    pub fn roots(&self) -> [&Path; 2] {
        [self.builtin.as_path(), self.workspace.as_path()]
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf, TemplateError> {
        let relative = Path::new(name);
        let well_formed = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !well_formed {
            return Err(TemplateError::InvalidPath(name.to_string()));
        }

        for root in self.roots() {
            let candidate = root.join(relative);
            if candidate.is_file() {
                debug!("Resolved template '{}' to {}", name, candidate.display());
                return Ok(candidate);
            }
        }

        Err(TemplateError::NotFound {
            name: name.to_string(),
            searched: self.roots().iter().map(|r| r.to_path_buf()).collect(),
            available: self.builtin_templates(),
        })
    }

    /// Relative paths of every file under the built-in root.
    pub fn builtin_templates(&self) -> Vec<String> {
        let pattern = format!(
            "{}/**/*",
            Pattern::escape(&self.builtin.display().to_string())
        );
        let Ok(paths) = glob(&pattern) else {
            return Vec::new();
        };

        let mut names = paths
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .filter_map(|p| {
                p.strip_prefix(&self.builtin)
                    .ok()
                    .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            })
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

/// Serves `{% include %}` targets from a [`SearchPath`].
#[derive(Debug)]
struct SearchPathSource {
    search_path: SearchPath,
    available: Vec<String>,
}

impl SearchPathSource {
    fn new(search_path: SearchPath) -> Self {
        let available = search_path.builtin_templates();
        Self {
            search_path,
            available,
        }
    }
}

impl PartialSource for SearchPathSource {
    fn contains(&self, name: &str) -> bool {
        self.search_path.resolve(name).is_ok()
    }

    fn names(&self) -> Vec<&str> {
        self.available.iter().map(String::as_str).collect()
    }

    fn try_get<'a>(&'a self, name: &str) -> Option<Cow<'a, str>> {
        let path = self.search_path.resolve(name).ok()?;
        fs::read_to_string(path).ok().map(Cow::Owned)
    }
}

/// Renders Liquid template files found through a [`SearchPath`].
///
/// Top-level variables the templates mention but the data lacks render as
/// empty. Output is not HTML-escaped.
pub struct TemplateRenderer {
    search_path: SearchPath,
}

impl TemplateRenderer {
    pub fn new(search_path: SearchPath) -> Self {
        Self { search_path }
    }

    pub fn render(&self, name: &str, context: Option<&Value>) -> Result<String, TemplateError> {
        let source = self.load(name)?;

        let mut chain = vec![name.to_string()];
        let mut roots = Vec::new();
        self.walk_includes(&source, &mut chain, &mut roots)?;

        let mut data = match context {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => return Err(TemplateError::Context(json_type(other))),
        };
        for root in roots {
            data.entry(root).or_insert(Value::Null);
        }
        let globals = liquid::to_object(&data).map_err(TemplateError::Render)?;

        let parser = ParserBuilder::with_stdlib()
            .partials(LazyCompiler::new(SearchPathSource::new(
                self.search_path.clone(),
            )))
            .build()
            .map_err(TemplateError::Syntax)?;
        let template = parser.parse(&source).map_err(TemplateError::Syntax)?;

        template.render(&globals).map_err(TemplateError::Render)
    }

    fn load(&self, name: &str) -> Result<String, TemplateError> {
        let path = self.search_path.resolve(name)?;
        fs::read_to_string(&path).map_err(|source| TemplateError::Read { path, source })
    }

    /// Follows literal includes depth first, failing on a file that includes
    /// itself through `chain`, and collects every variable root on the way.
    fn walk_includes(
        &self,
        source: &str,
        chain: &mut Vec<String>,
        roots: &mut Vec<String>,
    ) -> Result<(), TemplateError> {
        let scanned = scan(source);
        roots.extend(scanned.roots);

        for include in scanned.includes {
            if chain.contains(&include) {
                chain.push(include);
                return Err(TemplateError::IncludeCycle(chain.clone()));
            }

            let partial = match self.load(&include) {
                Ok(partial) => partial,
                // Left to the engine, which fails only if the include is reached.
                Err(TemplateError::NotFound { .. } | TemplateError::InvalidPath(_)) => {
                    debug!("Include '{}' not found on the search path", include);
                    continue;
                }
                Err(e) => return Err(e),
            };

            chain.push(include);
            self.walk_includes(&partial, chain, roots)?;
            chain.pop();
        }

        Ok(())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        builtin: TempDir,
        workspace: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                builtin: TempDir::new().unwrap(),
                workspace: TempDir::new().unwrap(),
            }
        }

        fn builtin(self, name: &str, content: &str) -> Self {
            write(self.builtin.path(), name, content);
            self
        }

        fn workspace(self, name: &str, content: &str) -> Self {
            write(self.workspace.path(), name, content);
            self
        }

        fn renderer(&self) -> TemplateRenderer {
            TemplateRenderer::new(SearchPath::new(self.builtin.path(), self.workspace.path()))
        }
    }

    fn write(root: &Path, name: &str, content: &str) {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn renders_workspace_only_template() {
        let fixture = Fixture::new().workspace(".github/comment.md", "from workspace");

        let actual = fixture.renderer().render(".github/comment.md", None).unwrap();

        assert_eq!(actual, "from workspace");
    }

    #[test]
    fn renders_builtin_only_template() {
        let fixture = Fixture::new().builtin("default.md", "from builtin");

        let actual = fixture.renderer().render("default.md", None).unwrap();

        assert_eq!(actual, "from builtin");
    }

    #[test]
    fn builtin_template_shadows_workspace() {
        let fixture = Fixture::new()
            .builtin("comment.md", "from builtin")
            .workspace("comment.md", "from workspace");

        let actual = fixture.renderer().render("comment.md", None).unwrap();

        assert_eq!(actual, "from builtin");
    }

    #[test]
    fn substitutes_payload_values() {
        let fixture = Fixture::new().workspace("hello.md", "Hello {{ name }}");

        let actual = fixture
            .renderer()
            .render("hello.md", Some(&json!({"name": "Alice"})))
            .unwrap();

        assert_eq!(actual, "Hello Alice");
    }

    #[test]
    fn supports_liquid_tags_and_filters() {
        let fixture = Fixture::new().workspace(
            "hi.md",
            "{% if name %}Hi {{ name | upcase }}{% endif %}",
        );

        let actual = fixture
            .renderer()
            .render("hi.md", Some(&json!({"name": "Alice"})))
            .unwrap();

        assert_eq!(actual, "Hi ALICE");
    }

    #[test]
    fn missing_variables_render_empty() {
        let fixture = Fixture::new().workspace("hello.md", "Hello {{ name }}");

        let actual = fixture.renderer().render("hello.md", None).unwrap();

        assert_eq!(actual, "Hello ");
    }

    #[test]
    fn missing_variables_are_falsy() {
        let fixture = Fixture::new().workspace(
            "who.md",
            "{% if user %}{{ user }}{% else %}anonymous{% endif %}",
        );

        let actual = fixture
            .renderer()
            .render("who.md", Some(&json!({"other": 1})))
            .unwrap();

        assert_eq!(actual, "anonymous");
    }

    #[test]
    fn rejects_non_object_data() {
        let fixture = Fixture::new().workspace("hello.md", "Hello {{ name }}");

        let err = fixture
            .renderer()
            .render("hello.md", Some(&json!(["Alice"])))
            .unwrap_err();

        assert!(matches!(err, TemplateError::Context("an array")), "{err:?}");
    }

    #[test]
    fn output_is_not_html_escaped() {
        let fixture = Fixture::new().workspace("code.md", "{{ snippet }}");

        let actual = fixture
            .renderer()
            .render("code.md", Some(&json!({"snippet": "a < b && \"c\""})))
            .unwrap();

        assert_eq!(actual, "a < b && \"c\"");
    }

    #[test]
    fn includes_files_through_search_path() {
        let fixture = Fixture::new()
            .builtin("partials/footer.md", "-- {{ bot }}")
            .workspace("partials/header.md", "# {{ title }}")
            .workspace(
                "comment.md",
                "{% include 'partials/header.md' %} | body | {% include 'partials/footer.md' %}",
            );

        let actual = fixture
            .renderer()
            .render("comment.md", Some(&json!({"title": "Report", "bot": "ci"})))
            .unwrap();

        assert_eq!(actual, "# Report | body | -- ci");
    }

    #[test]
    fn nested_includes_are_followed() {
        let fixture = Fixture::new()
            .workspace("a.md", "A{% include 'b.md' %}")
            .workspace("b.md", "B{% include 'c.md' %}")
            .workspace("c.md", "C{{ missing }}");

        let actual = fixture.renderer().render("a.md", None).unwrap();

        assert_eq!(actual, "ABC");
    }

    #[test]
    fn repeated_includes_are_not_a_cycle() {
        let fixture = Fixture::new()
            .workspace("list.md", "{% include 'dot.md' %}{% include 'dot.md' %}")
            .workspace("dot.md", ".");

        let actual = fixture.renderer().render("list.md", None).unwrap();

        assert_eq!(actual, "..");
    }

    #[test]
    fn include_cycle_is_an_error() {
        let fixture = Fixture::new()
            .workspace("a.md", "A{% include 'b.md' %}")
            .workspace("b.md", "B{% include 'a.md' %}");

        let err = fixture.renderer().render("a.md", None).unwrap_err();

        match &err {
            TemplateError::IncludeCycle(chain) => {
                assert_eq!(chain, &vec!["a.md", "b.md", "a.md"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "template include cycle: a.md -> b.md -> a.md");
    }

    #[test]
    fn self_include_is_an_error() {
        let fixture = Fixture::new().workspace("loop.md", "{% include 'loop.md' %}");

        let err = fixture.renderer().render("loop.md", None).unwrap_err();

        assert!(matches!(err, TemplateError::IncludeCycle(_)), "{err:?}");
    }

    #[test]
    fn missing_include_fails_render() {
        let fixture = Fixture::new().workspace("comment.md", "x{% include 'nowhere.md' %}");

        let err = fixture.renderer().render("comment.md", None).unwrap_err();

        assert!(matches!(err, TemplateError::Render(_)), "{err:?}");
    }

    #[test]
    fn missing_template_lists_roots_and_builtins() {
        let fixture = Fixture::new().builtin("default.md", "x");

        let err = fixture.renderer().render("nope.md", None).unwrap_err();

        match &err {
            TemplateError::NotFound {
                name,
                searched,
                available,
            } => {
                assert_eq!(name, "nope.md");
                assert_eq!(searched.len(), 2);
                assert_eq!(available, &vec!["default.md".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("default.md"));
    }

    #[test]
    fn rejects_paths_escaping_roots() {
        let fixture = Fixture::new();

        for bad in ["", "../secret.md", "/etc/passwd", "a/../../b.md"] {
            let err = fixture.renderer().render(bad, None).unwrap_err();
            assert!(matches!(err, TemplateError::InvalidPath(_)), "{bad}: {err:?}");
        }
    }

    #[test]
    fn shipped_result_template_renders() {
        let builtin = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");
        let workspace = TempDir::new().unwrap();
        let renderer = TemplateRenderer::new(SearchPath::new(builtin, workspace.path()));

        let actual = renderer
            .render(
                "result.md",
                Some(&json!({
                    "title": "Checks",
                    "items": [
                        {"name": "build", "ok": true, "details": null},
                        {"name": "test", "ok": false, "details": "2 failed"}
                    ]
                })),
            )
            .unwrap();

        assert!(actual.starts_with("### Checks"), "{actual}");
        assert!(actual.contains("- ✅ build\n"), "{actual}");
        assert!(actual.contains("- ❌ test: 2 failed"), "{actual}");
        assert!(actual.contains("Posted by issue-comment-template"), "{actual}");
    }

    #[test]
    fn shipped_default_template_renders_without_data() {
        let builtin = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");
        let workspace = TempDir::new().unwrap();
        let renderer = TemplateRenderer::new(SearchPath::new(builtin, workspace.path()));

        let actual = renderer.render("default.md", None).unwrap();

        assert_eq!(actual.trim_end(), "This comment was posted automatically.");
    }

    #[test]
    fn syntax_errors_are_reported() {
        let fixture = Fixture::new().workspace("broken.md", "{% if ok %}unterminated");

        let err = fixture.renderer().render("broken.md", None).unwrap_err();

        assert!(matches!(err, TemplateError::Syntax(_)), "{err:?}");
    }
}
