//! Build targets: platforms, architectures and the fixed target set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target operating system for an installer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Windows installer (.exe)
    Windows,
    /// macOS disk image (.dmg)
    MacOs,
    /// Linux AppImage
    Linux,
}

impl Platform {
    /// Every supported platform, in build-report order.
    pub const ALL: [Platform; 3] = [Platform::Windows, Platform::MacOs, Platform::Linux];

    /// Lowercase identifier used in paths, config keys and logs.
    pub fn short_name(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
        }
    }

    /// Human readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "windows" | "win" => Ok(Platform::Windows),
            "macos" | "darwin" | "mac" => Ok(Platform::MacOs),
            "linux" => Ok(Platform::Linux),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// CPU architecture of an installer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// x86_64 / amd64
    X64,
    /// aarch64
    Arm64,
}

impl Arch {
    /// Identifier used in canonical artifact names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Ok(Arch::X64),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(format!("unknown architecture '{}'", other)),
        }
    }
}

/// Steps a platform builder runs for each architecture.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildStep {
    /// Opaque packaging toolchain
    Package,
    /// Opaque signing / notarization toolchain
    Sign,
    /// Rename to the canonical file name
    Normalize,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStep::Package => "package",
            BuildStep::Sign => "sign",
            BuildStep::Normalize => "normalize",
        })
    }
}

/// One unit of packaging work: a platform and the architectures built for it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildTarget {
    platform: Platform,
    architectures: Vec<Arch>,
}

impl BuildTarget {
    /// Create a target; duplicate architectures are dropped, first occurrence wins.
    pub fn new(platform: Platform, architectures: impl IntoIterator<Item = Arch>) -> Self {
        let mut ordered: Vec<Arch> = Vec::new();
        for arch in architectures {
            if !ordered.contains(&arch) {
                ordered.push(arch);
            }
        }
        Self {
            platform,
            architectures: ordered,
        }
    }

    /// The three targets shipped by default, each for x64 and arm64.
    pub fn standard_set() -> Vec<BuildTarget> {
        Platform::ALL
            .iter()
            .map(|p| BuildTarget::new(*p, [Arch::X64, Arch::Arm64]))
            .collect()
    }

    /// Target platform
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Architectures, in build order
    pub fn architectures(&self) -> &[Arch] {
        &self.architectures
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let archs: Vec<&str> = self.architectures.iter().map(Arch::as_str).collect();
        write!(f, "{} [{}]", self.platform, archs.join(", "))
    }
}
