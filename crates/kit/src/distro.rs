//! OS type/variant registry and distro detection
//!
//! Detection of the distribution behind an install location is a hint for
//! guest creation, never a requirement: probe failures are logged and turn
//! into "unknown", and whatever a probe reports is checked against the
//! [`OsRegistry`] before anybody uses it.

use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use color_eyre::{eyre::Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::location::Location;

const BUILTIN_REGISTRY: &str = include_str!("os_registry.toml");

/// Registry entry for an OS variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OsVariantInfo {
    /// Human readable name
    pub label: Option<String>,
    /// Overrides the type's `pv-cdrom-install` when set
    pub pv_cdrom_install: Option<bool>,
}

/// Registry entry for an OS type (family)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OsTypeInfo {
    /// Human readable name
    pub label: Option<String>,
    /// Paravirtualized installs of this OS must boot media from a CD-ROM
    #[serde(default)]
    pub pv_cdrom_install: bool,
    /// Known variants of this type
    #[serde(default)]
    pub variants: BTreeMap<String, OsVariantInfo>,
}

/// Known OS types and their variants
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OsRegistry {
    /// OS types keyed by name
    #[serde(default)]
    pub types: BTreeMap<String, OsTypeInfo>,
}

impl OsRegistry {
    /// The registry shipped with vinst
    pub fn builtin() -> Self {
        // Parsed by test_builtin_registry_parses; failure here is a build defect
        toml::from_str(BUILTIN_REGISTRY).unwrap_or_default()
    }

    /// Parse a registry from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse OS registry")
    }

    /// Load a registry file
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read OS registry: {}", path))?;
        Self::from_toml_str(&content).with_context(|| format!("In {}", path))
    }

    /// Add or replace a type; mostly useful when building registries in code
    pub fn with_type(mut self, name: &str, pv_cdrom_install: bool, variants: &[&str]) -> Self {
        let info = OsTypeInfo {
            label: None,
            pv_cdrom_install,
            variants: variants
                .iter()
                .map(|v| (v.to_string(), OsVariantInfo::default()))
                .collect(),
        };
        self.types.insert(name.to_owned(), info);
        self
    }

    /// Look up an OS type
    pub fn get(&self, os_type: &str) -> Option<&OsTypeInfo> {
        self.types.get(os_type)
    }

    /// Whether `variant` is a registered variant of `os_type`
    pub fn has_variant(&self, os_type: &str, variant: &str) -> bool {
        self.get(os_type)
            .is_some_and(|t| t.variants.contains_key(variant))
    }

    /// Whether a guest of this type/variant needs its install media on a
    /// CD-ROM rather than a plain disk
    pub fn requires_pv_cdrom_install(&self, os_type: Option<&str>, variant: Option<&str>) -> bool {
        let Some(info) = os_type.and_then(|t| self.get(t)) else {
            return false;
        };
        variant
            .and_then(|v| info.variants.get(v))
            .and_then(|v| v.pv_cdrom_install)
            .unwrap_or(info.pv_cdrom_install)
    }
}

/// A registry-consistent OS type and optional variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DistroIdentity {
    /// OS type known to the registry
    pub os_type: String,
    /// Variant of `os_type`, if it is a known one
    pub os_variant: Option<String>,
    /// Registry label of the variant, or of the type without one
    pub label: Option<String>,
}

/// Check a detected (type, variant) pair against the registry.
///
/// An unknown type discards the whole result; a known type with an unknown
/// variant keeps the type.
pub fn validate(
    os_type: Option<&str>,
    os_variant: Option<&str>,
    registry: &OsRegistry,
) -> Option<DistroIdentity> {
    let Some((os_type, info)) = os_type.and_then(|t| registry.get(t).map(|info| (t, info))) else {
        debug!("Type returned from distro detection is not valid: {:?}", os_type);
        return None;
    };

    let variant = os_variant.and_then(|v| info.variants.get_key_value(v));
    if variant.is_none() {
        debug!("Variant returned from distro detection is not valid: {:?}", os_variant);
    }

    Some(DistroIdentity {
        os_type: os_type.to_owned(),
        os_variant: variant.map(|(name, _)| name.clone()),
        label: variant
            .and_then(|(_, v)| v.label.clone())
            .or_else(|| info.label.clone()),
    })
}

/// Inspects install media to guess the distribution on it
pub trait DistroProbe {
    /// Return the raw (type, variant) guess for `location`
    fn detect(&self, location: &Location, arch: &str) -> Result<(Option<String>, Option<String>)>;
}

/// Detect the distribution at `location`, best effort.
///
/// Probe errors are logged and reported as `None`.
pub fn detect_distro(
    probe: &dyn DistroProbe,
    location: &Location,
    arch: &str,
    registry: &OsRegistry,
) -> Option<DistroIdentity> {
    match probe.detect(location, arch) {
        Ok((os_type, os_variant)) => validate(os_type.as_deref(), os_variant.as_deref(), registry),
        Err(e) => {
            warn!("Error attempting to detect distro at {}: {:#}", location, e);
            None
        }
    }
}

/// Map the contents of a `.treeinfo` file to a (type, variant) guess.
///
/// Both the legacy `[general] family=` and the newer `[release] name=`
/// layouts are understood.
pub fn guess_from_treeinfo(content: &str) -> (Option<String>, Option<String>) {
    let mut section = String::new();
    let mut family = None;
    let mut version = None;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_owned();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim().to_owned());
        match (section.as_str(), key) {
            ("release", "name") => family = Some(value),
            ("release", "version") => version = Some(value),
            ("general", "family") => {
                family.get_or_insert(value);
            }
            ("general", "version") => {
                version.get_or_insert(value);
            }
            _ => {}
        }
    }

    let Some(family) = family.map(|f| f.to_lowercase()) else {
        return (None, None);
    };
    let major = version
        .as_deref()
        .and_then(|v| v.split('.').next())
        .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()));

    let prefix = if family.contains("fedora") {
        Some("fedora")
    } else if family.contains("red hat enterprise linux") || family.contains("centos") {
        Some("rhel")
    } else if family.contains("suse") {
        Some("sles")
    } else {
        None
    };
    let variant = prefix.zip(major).map(|(p, m)| format!("{p}{m}"));
    (Some("linux".to_owned()), variant)
}
