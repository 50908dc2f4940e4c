//! Parameterized extraction query rendering.
//!
//! Uses `minijinja`, a Jinja-syntax-compatible templating crate, rather
//! than a hand-rolled substitution engine, since queries need full
//! conditionals and loops, not just `{{ var }}` substitution.

use chrono::{DateTime, Utc};
use minijinja::value::Value as JinjaValue;
use minijinja::{Environment, UndefinedBehavior};

use crate::error::{CoreError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Whether undefined template variables are an error or render empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateMode {
    Strict,
    Lenient,
}

/// Renders a user-supplied query string, injecting the reserved time-range
/// variables and any caller-supplied context. User context overrides
/// built-ins on key collision.
pub struct QueryTemplate {
    mode: TemplateMode,
}

impl Default for QueryTemplate {
    fn default() -> Self {
        Self::new(TemplateMode::Lenient)
    }
}

impl QueryTemplate {
    pub fn new(mode: TemplateMode) -> Self {
        Self { mode }
    }

    /// Render `query` with the reserved window/interval variables plus
    /// `context`. `context` entries win over the built-ins of the same
    /// name.
    pub fn render(
        &self,
        query: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        interval_seconds: i64,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String> {
        let mut env = Environment::new();
        env.set_undefined_behavior(match self.mode {
            TemplateMode::Strict => UndefinedBehavior::Strict,
            TemplateMode::Lenient => UndefinedBehavior::Lenient,
        });
        env.add_template("query", query)
            .map_err(|e| CoreError::BadTemplate(e.to_string()))?;

        let mut vars = serde_json::Map::new();
        vars.insert(
            "dtk_start_time".to_string(),
            serde_json::Value::String(window_start.format(TIMESTAMP_FORMAT).to_string()),
        );
        vars.insert(
            "dtk_end_time".to_string(),
            serde_json::Value::String(window_end.format(TIMESTAMP_FORMAT).to_string()),
        );
        vars.insert(
            "interval_seconds".to_string(),
            serde_json::Value::from(interval_seconds),
        );
        for (key, value) in context {
            vars.insert(key.clone(), value.clone());
        }

        let template = env
            .get_template("query")
            .map_err(|e| CoreError::BadTemplate(e.to_string()))?;
        let value = JinjaValue::from_serialize(&serde_json::Value::Object(vars));
        template
            .render(value)
            .map_err(|e| CoreError::BadTemplate(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn render(
        query: &str,
        context: serde_json::Map<String, serde_json::Value>,
        mode: TemplateMode,
    ) -> Result<String> {
        let template = QueryTemplate::new(mode);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        template.render(query, start, end, 600, &context)
    }

    #[test]
    fn simple_variable_substitution() {
        let mut ctx = serde_json::Map::new();
        ctx.insert("table_name".into(), "metrics".into());
        let rendered = render("SELECT * FROM {{ table_name }}", ctx, TemplateMode::Lenient).unwrap();
        assert_eq!(rendered, "SELECT * FROM metrics");
    }

    #[test]
    fn built_in_window_variables() {
        let rendered = render(
            "{{ dtk_start_time }} .. {{ dtk_end_time }} @ {{ interval_seconds }}",
            serde_json::Map::new(),
            TemplateMode::Lenient,
        )
        .unwrap();
        assert_eq!(rendered, "2024-01-01 00:00:00 .. 2024-01-02 00:00:00 @ 600");
    }

    #[test]
    fn context_overrides_builtin() {
        let mut ctx = serde_json::Map::new();
        ctx.insert("interval_seconds".into(), 300.into());
        let rendered = render(
            "{{ interval_seconds }}",
            ctx,
            TemplateMode::Lenient,
        )
        .unwrap();
        assert_eq!(rendered, "300");
    }

    #[test]
    fn conditional_if_else() {
        let mut ctx = serde_json::Map::new();
        ctx.insert("use_cache".into(), true.into());
        let rendered = render(
            "FROM {% if use_cache %}cache_metrics{% else %}metrics{% endif %}",
            ctx,
            TemplateMode::Lenient,
        )
        .unwrap();
        assert_eq!(rendered, "FROM cache_metrics");
    }

    #[test]
    fn loop_over_list() {
        let mut ctx = serde_json::Map::new();
        ctx.insert(
            "cols".into(),
            serde_json::Value::Array(vec!["a".into(), "b".into(), "c".into()]),
        );
        let rendered = render(
            "{% for c in cols %}{{ c }},{% endfor %}",
            ctx,
            TemplateMode::Lenient,
        )
        .unwrap();
        assert_eq!(rendered, "a,b,c,");
    }

    #[test]
    fn strict_mode_fails_on_undefined_variable() {
        let result = render("{{ nope }}", serde_json::Map::new(), TemplateMode::Strict);
        assert!(result.is_err());
    }

    #[test]
    fn lenient_mode_renders_undefined_as_empty() {
        let rendered = render("[{{ nope }}]", serde_json::Map::new(), TemplateMode::Lenient).unwrap();
        assert_eq!(rendered, "[]");
    }
}
