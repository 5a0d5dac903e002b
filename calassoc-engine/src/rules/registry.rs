//! Instrument registry
//!
//! Maps instrument identifiers to rule modules. GMOS-N and GMOS-S share one
//! module; anything unregistered falls back to `NULL_MODULE`, which yields no
//! applicable categories.

use super::{Category, RuleModule};
use super::{F2, GHOST, GMOS, GNIRS, GPI, GSAOI, MICHELLE, NICI, NIFS, NIRI};
use calassoc_common::{DescriptorSet, Error, Instrument, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Registry value meaning "no rule module"
pub const NONE_NAME: &str = "none";

fn nothing_applicable(_: &DescriptorSet) -> Vec<Category> {
    Vec::new()
}

/// Fallback for unregistered instruments
pub static NULL_MODULE: RuleModule = RuleModule {
    name: "none",
    instr_descriptors: &[],
    set_applicable: nothing_applicable,
    categories: &[],
    reverse_window_days: 0,
};

/// Every module shipped with the engine
static MODULES: &[&RuleModule] = &[
    &GMOS, &GHOST, &F2, &GNIRS, &NIRI, &NIFS, &NICI, &GSAOI, &GPI, &MICHELLE,
];

#[derive(Debug, Clone)]
pub struct Registry {
    modules: BTreeMap<Instrument, &'static RuleModule>,
}

impl Registry {
    /// Default instrument mapping
    pub fn standard() -> Self {
        let modules = [
            (Instrument::GmosN, &GMOS),
            (Instrument::GmosS, &GMOS),
            (Instrument::Ghost, &GHOST),
            (Instrument::F2, &F2),
            (Instrument::Gnirs, &GNIRS),
            (Instrument::Niri, &NIRI),
            (Instrument::Nifs, &NIFS),
            (Instrument::Nici, &NICI),
            (Instrument::Gsaoi, &GSAOI),
            (Instrument::Gpi, &GPI),
            (Instrument::Michelle, &MICHELLE),
        ]
        .into_iter()
        .collect();
        Self { modules }
    }

    /// Standard mapping with `[registry]` overrides applied
    ///
    /// Values name a module (case-insensitive) or `none` to disable an
    /// instrument.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut registry = Self::standard();
        for (instrument, module_name) in overrides {
            let instrument = Instrument::from(instrument.as_str());
            let module = if module_name.eq_ignore_ascii_case(NONE_NAME) {
                &NULL_MODULE
            } else {
                Self::module_by_name(module_name).ok_or_else(|| {
                    Error::Config(format!(
                        "Unknown rule module '{}' for instrument '{}'",
                        module_name, instrument
                    ))
                })?
            };
            debug!(instrument = %instrument, module = module.name, "Registry override");
            registry.modules.insert(instrument, module);
        }
        Ok(registry)
    }

    /// Distinct modules shipped with the engine
    pub fn modules() -> &'static [&'static RuleModule] {
        MODULES
    }

    pub fn module_by_name(name: &str) -> Option<&'static RuleModule> {
        MODULES
            .iter()
            .copied()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Rule module for an instrument, `NULL_MODULE` when none is registered
    pub fn module_for(&self, instrument: &Instrument) -> &'static RuleModule {
        match self.modules.get(instrument) {
            Some(module) => module,
            None => {
                debug!(instrument = %instrument, "No rule module registered");
                &NULL_MODULE
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gmos_fold_and_fallback() {
        let registry = Registry::standard();
        assert_eq!(registry.module_for(&Instrument::GmosN).name, "GMOS");
        assert_eq!(registry.module_for(&Instrument::GmosS).name, "GMOS");
        assert_eq!(registry.module_for(&Instrument::Michelle).name, "MICHELLE");
        let other = Instrument::from("bHROS");
        assert_eq!(registry.module_for(&other).name, NULL_MODULE.name);
    }

    #[test]
    fn test_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("NICI".to_string(), "none".to_string());
        overrides.insert("TReCS".to_string(), "michelle".to_string());
        let registry = Registry::with_overrides(&overrides).unwrap();
        assert_eq!(registry.module_for(&Instrument::Nici).name, "none");
        assert_eq!(registry.module_for(&Instrument::from("TReCS")).name, "MICHELLE");

        overrides.insert("F2".to_string(), "FLAMINGOS".to_string());
        assert!(matches!(
            Registry::with_overrides(&overrides),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_module_names_are_unique() {
        let mut names: Vec<_> = Registry::modules().iter().map(|m| m.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Registry::modules().len());
    }
}
