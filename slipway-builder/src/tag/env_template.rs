//! Environment template tagger

use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use super::Tagger;
use crate::error::BuildError;

/// Stand-in for the digest fields, removed after rendering
const DIGEST_SENTINEL: &str = "_DEPRECATED_DIGEST_";

const DIGEST_FIELDS: [&str; 3] = ["DIGEST", "DIGEST_ALGO", "DIGEST_HEX"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(String),
}

/// Renders a template of literal text and `{{.NAME}}` fields
///
/// Fields resolve from the environment, except `IMAGE_NAME`, which is
/// always the artifact's image name. The legacy `DIGEST`, `DIGEST_ALGO` and
/// `DIGEST_HEX` fields render as nothing, together with a `:` or `-` in
/// front of them. Unknown variables render as the empty string.
#[derive(Debug, Clone)]
pub struct EnvTemplateTagger {
    segments: Vec<Segment>,

    /// Fixed environment; the process environment when `None`
    env: Option<HashMap<String, String>>,
}

impl EnvTemplateTagger {
    /// Parses a template
    ///
    /// # Errors
    /// [`BuildError::InvalidTemplate`] on an unterminated `{{` or an action
    /// that is not a `.NAME` field
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        let segments = parse(&template).map_err(|reason| BuildError::InvalidTemplate {
            template: template.clone(),
            reason,
        })?;

        if segments
            .iter()
            .any(|s| matches!(s, Segment::Field(name) if DIGEST_FIELDS.contains(&name.as_str())))
        {
            warn!(
                "Tag template {:?} uses a deprecated digest field, it will be ignored",
                template
            );
        }

        Ok(Self {
            segments,
            env: None,
        })
    }

    /// Resolves fields from `env` instead of the process environment
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    fn lookup(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(env) => env.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    fn render(&self, image_name: &str) -> String {
        let mut rendered = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Field(name) if name == "IMAGE_NAME" => rendered.push_str(image_name),
                Segment::Field(name) if DIGEST_FIELDS.contains(&name.as_str()) => {
                    rendered.push_str(DIGEST_SENTINEL)
                }
                Segment::Field(name) => {
                    rendered.push_str(&self.lookup(name).unwrap_or_default())
                }
            }
        }

        rendered
            .replace(&format!(":{}", DIGEST_SENTINEL), "")
            .replace(&format!("-{}", DIGEST_SENTINEL), "")
            .replace(DIGEST_SENTINEL, "")
    }
}

impl Tagger for EnvTemplateTagger {
    fn label(&self) -> &'static str {
        "envTemplate"
    }

    fn generate_fully_qualified_image_name(
        &self,
        _workspace: &Path,
        image_name: &str,
    ) -> Result<String> {
        Ok(self.render(image_name))
    }
}

fn parse(template: &str) -> std::result::Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(Segment::Text(rest[..start].to_string()));
        }

        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| "unclosed action".to_string())?;

        let action = after[..end].trim();
        let name = action
            .strip_prefix('.')
            .filter(|name| {
                !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
            .ok_or_else(|| format!("unsupported action {:?}", action))?;

        segments.push(Segment::Field(name.to_string()));
        rest = &after[end + 2..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn tag(template: &str, vars: &[(&str, &str)], image: &str) -> String {
        EnvTemplateTagger::new(template)
            .unwrap()
            .with_env(env(vars))
            .generate_fully_qualified_image_name(Path::new("."), image)
            .unwrap()
    }

    #[test]
    fn test_digest_is_dropped() {
        assert_eq!(tag("{{.IMAGE_NAME}}:{{.DIGEST}}", &[], "foo"), "foo");
        assert_eq!(
            tag("{{.IMAGE_NAME}}:{{.DIGEST_ALGO}}-{{.DIGEST_HEX}}", &[], "foo"),
            "foo"
        );
    }

    #[test]
    fn test_env_variables() {
        assert_eq!(
            tag(
                "{{.FOO}}-{{.BAZ}}:latest",
                &[("FOO", "BAR"), ("BAZ", "BAT")],
                "foo"
            ),
            "BAR-BAT:latest"
        );
    }

    #[test]
    fn test_image_name_overrides_env() {
        assert_eq!(
            tag(
                "{{.IMAGE_NAME}}:{{.FROM_ENV}}",
                &[("IMAGE_NAME", "from-env"), ("FROM_ENV", "v1")],
                "foo"
            ),
            "foo:v1"
        );
    }

    #[test]
    fn test_unknown_variable_is_empty() {
        assert_eq!(tag("{{.IMAGE_NAME}}:v{{.MISSING}}", &[], "foo"), "foo:v");
    }

    #[test]
    fn test_invalid_template() {
        let err = EnvTemplateTagger::new("{{.FOO").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::InvalidTemplate { .. })
        ));

        assert!(EnvTemplateTagger::new("{{FOO}}").is_err());
        assert!(EnvTemplateTagger::new("{{.}}").is_err());
    }

    #[test]
    fn test_parse_segments() {
        assert_eq!(
            parse("a{{ .B }}c").unwrap(),
            vec![
                Segment::Text("a".to_string()),
                Segment::Field("B".to_string()),
                Segment::Text("c".to_string()),
            ]
        );
        assert_eq!(parse("").unwrap(), vec![]);
    }
}
