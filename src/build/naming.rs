//! Canonical artifact naming.
//!
//! Packaging toolchains do not agree on output names; the Windows x64
//! installer in particular comes out without any architecture marker. Every
//! builder output is therefore mapped through a [`NamingTable`] keyed by
//! (platform, architecture): the `emitted` template says what the toolchain
//! writes, and the canonical name is always
//! `<product>-<version>-<arch>.<extension>`.

use super::target::{Arch, Platform};
use super::template::{render, TemplateVars};
use handlebars::RenderError;
use std::collections::BTreeMap;

/// Naming rule for one (platform, architecture) pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NamingRule {
    /// Template of the file name the toolchain emits (`{{product}}`, `{{version}}`, `{{arch}}`, `{{platform}}`)
    pub emitted: String,
    /// Extension of the canonical name, without the dot
    pub extension: String,
}

impl NamingRule {
    /// Create a rule
    pub fn new(emitted: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            emitted: emitted.into(),
            extension: extension.into(),
        }
    }
}

/// Declarative rule table for every supported (platform, architecture).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NamingTable {
    rules: BTreeMap<(Platform, Arch), NamingRule>,
}

impl Default for NamingTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl NamingTable {
    /// Rules matching the stock packaging scripts.
    pub fn standard() -> Self {
        let mut rules = BTreeMap::new();
        // makensis names the x64 installer without an architecture suffix
        rules.insert(
            (Platform::Windows, Arch::X64),
            NamingRule::new("{{product}}-{{version}}.exe", "exe"),
        );
        rules.insert(
            (Platform::Windows, Arch::Arm64),
            NamingRule::new("{{product}}-{{version}}-arm64.exe", "exe"),
        );
        rules.insert(
            (Platform::MacOs, Arch::X64),
            NamingRule::new("{{product}}-{{version}}-x64.dmg", "dmg"),
        );
        rules.insert(
            (Platform::MacOs, Arch::Arm64),
            NamingRule::new("{{product}}-{{version}}-arm64.dmg", "dmg"),
        );
        rules.insert(
            (Platform::Linux, Arch::X64),
            NamingRule::new("{{product}}-{{version}}-x64.AppImage", "AppImage"),
        );
        rules.insert(
            (Platform::Linux, Arch::Arm64),
            NamingRule::new("{{product}}-{{version}}-arm64.AppImage", "AppImage"),
        );
        Self { rules }
    }

    /// Replace (or add) the rule for one pair.
    pub fn set_rule(&mut self, platform: Platform, arch: Arch, rule: NamingRule) {
        self.rules.insert((platform, arch), rule);
    }

    /// Look up the rule for one pair.
    pub fn rule(&self, platform: Platform, arch: Arch) -> Option<&NamingRule> {
        self.rules.get(&(platform, arch))
    }

    /// File name the toolchain is expected to write; `None` without a rule.
    pub fn emitted_name(
        &self,
        platform: Platform,
        arch: Arch,
        product: &str,
        version: &str,
    ) -> Result<Option<String>, RenderError> {
        let vars = TemplateVars::from([
            ("product", product),
            ("version", version),
            ("arch", arch.as_str()),
            ("platform", platform.short_name()),
        ]);
        self.rule(platform, arch)
            .map(|rule| render(&rule.emitted, &vars))
            .transpose()
    }

    /// Canonical `<product>-<version>-<arch>.<ext>` name.
    pub fn canonical_name(
        &self,
        platform: Platform,
        arch: Arch,
        product: &str,
        version: &str,
    ) -> Option<String> {
        self.rule(platform, arch)
            .map(|rule| format!("{}-{}-{}.{}", product, version, arch, rule.extension))
    }

    /// Pairs whose canonical names coincide, for config validation.
    pub fn colliding_pairs(&self) -> Vec<((Platform, Arch), (Platform, Arch))> {
        let mut seen: BTreeMap<String, (Platform, Arch)> = BTreeMap::new();
        let mut collisions = Vec::new();
        for (&(platform, arch), rule) in &self.rules {
            let key = format!("{}.{}", arch, rule.extension.to_ascii_lowercase());
            if let Some(first) = seen.get(&key) {
                collisions.push((*first, (platform, arch)));
            } else {
                seen.insert(key, (platform, arch));
            }
        }
        collisions
    }
}
