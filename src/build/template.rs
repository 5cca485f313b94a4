//! Handlebars rendering of command and file name templates.
//!
//! Templates use `{{product}}`-style placeholders. Rendering is strict: a
//! placeholder without a value is an error, never an empty string, so a
//! typo in `release.toml` cannot silently produce a wrong command line.

use handlebars::{Handlebars, RenderError};
use std::collections::BTreeMap;

/// Placeholders available in `[[naming]]` emitted-name templates
pub const NAME_KEYS: &[&str] = &["product", "version", "arch", "platform"];

/// Placeholders available in package and sign command templates
pub const COMMAND_KEYS: &[&str] = &[
    "product",
    "version",
    "arch",
    "platform",
    "channel",
    "out_dir",
    "source_ref",
    "file",
];

/// Values substituted into a template
pub type TemplateVars<'a> = BTreeMap<&'static str, &'a str>;

fn registry() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.set_strict_mode(true);
    handlebars
}

/// Render one template.
pub fn render(template: &str, vars: &TemplateVars<'_>) -> Result<String, RenderError> {
    registry().render_template(template, vars)
}

/// Render every argument of a command template.
pub fn render_args(argv: &[String], vars: &TemplateVars<'_>) -> Result<Vec<String>, RenderError> {
    let handlebars = registry();
    argv.iter()
        .map(|arg| handlebars.render_template(arg, vars))
        .collect()
}

/// Check that `template` parses and only uses placeholders from `keys`.
pub fn check(template: &str, keys: &[&'static str]) -> Result<(), RenderError> {
    let vars: TemplateVars<'_> = keys.iter().map(|&k| (k, "x")).collect();
    render(template, &vars).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVars<'static> {
        TemplateVars::from([("product", "kodegen"), ("version", "1.0.0")])
    }

    #[test]
    fn test_render_substitutes_without_escaping() {
        let out = render("{{product}}-{{version}}.exe", &vars()).unwrap();
        assert_eq!(out, "kodegen-1.0.0.exe");

        let path = TemplateVars::from([("file", "/tmp/a&b <x>.exe")]);
        assert_eq!(render("{{file}}", &path).unwrap(), "/tmp/a&b <x>.exe");
    }

    #[test]
    fn test_unknown_placeholder_is_an_error() {
        assert!(render("{{product}}-{{nope}}.exe", &vars()).is_err());
    }

    #[test]
    fn test_render_args_keeps_literal_arguments() {
        let argv = vec!["pwsh".to_string(), "-File".to_string(), "{{product}}.ps1".to_string()];
        assert_eq!(
            render_args(&argv, &vars()).unwrap(),
            vec!["pwsh", "-File", "kodegen.ps1"]
        );
    }

    #[test]
    fn test_check_limits_placeholders_to_the_allowed_keys() {
        assert!(check("{{product}}-{{arch}}.dmg", NAME_KEYS).is_ok());
        assert!(check("{{out_dir}}/{{product}}.dmg", NAME_KEYS).is_err());
        assert!(check("sign {{file}}", COMMAND_KEYS).is_ok());
        assert!(check("{{product", COMMAND_KEYS).is_err());
    }
}
