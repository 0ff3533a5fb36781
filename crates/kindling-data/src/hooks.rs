//! Hook Names and Resolution
//!
//! Every overridable extension point is addressed by a name of the form
//! `{stage_}{key_}{base}` (for example `train_input_per_sample_transform`).
//! Overrides are registered into a [`HookTable`] keyed by the parsed
//! [`HookName`], and resolution is a deterministic lookup:
//!
//! 1. the stage-specialized name wins over the generic one when overridden;
//! 2. between a plain hook and its key-scoped form, the one that is
//!    overridden is used; when both are overridden the stage-specialized one
//!    wins, and equal specialization is rejected as ambiguous.
//!
//! A slot nobody registered is [`HookSlot::Unset`] and never takes part in
//! composition.

use indexmap::IndexMap;
use kindling_core::{DataKeys, KindlingError, Result, RunningStage};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// A closed set of hook base names
pub trait HookBase: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    fn base_name(self) -> &'static str;

    fn all() -> &'static [Self];

    /// Whether `input_`/`target_` scoped variants of this hook exist
    fn allows_key(self) -> bool {
        true
    }
}

/// The five pipeline points where a transform can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookPlacement {
    PerSampleTransform,
    PerBatchTransform,
    Collate,
    PerSampleTransformOnDevice,
    PerBatchTransformOnDevice,
}

impl HookPlacement {
    pub const ALL: [HookPlacement; 5] = [
        HookPlacement::PerSampleTransform,
        HookPlacement::PerBatchTransform,
        HookPlacement::Collate,
        HookPlacement::PerSampleTransformOnDevice,
        HookPlacement::PerBatchTransformOnDevice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HookPlacement::PerSampleTransform => "per_sample_transform",
            HookPlacement::PerBatchTransform => "per_batch_transform",
            HookPlacement::Collate => "collate",
            HookPlacement::PerSampleTransformOnDevice => "per_sample_transform_on_device",
            HookPlacement::PerBatchTransformOnDevice => "per_batch_transform_on_device",
        }
    }

    pub fn is_on_device(self) -> bool {
        matches!(
            self,
            HookPlacement::PerSampleTransformOnDevice | HookPlacement::PerBatchTransformOnDevice
        )
    }
}

impl HookBase for HookPlacement {
    fn base_name(self) -> &'static str {
        self.as_str()
    }

    fn all() -> &'static [Self] {
        &Self::ALL
    }

    fn allows_key(self) -> bool {
        self != HookPlacement::Collate
    }
}

impl fmt::Display for HookPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPlacement {
    type Err = KindlingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                KindlingError::configuration_with(
                    format!(
                        "Unknown hook placement '{}'. Only {:?} are supported.",
                        s,
                        Self::ALL.map(HookPlacement::as_str)
                    ),
                    [s],
                )
            })
    }
}

/// Sample key a scoped hook applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPrefix {
    Input,
    Target,
}

impl KeyPrefix {
    pub const ALL: [KeyPrefix; 2] = [KeyPrefix::Input, KeyPrefix::Target];

    pub fn prefix(self) -> &'static str {
        match self {
            KeyPrefix::Input => "input",
            KeyPrefix::Target => "target",
        }
    }

    /// The sample mapping key the scoped hook reads and replaces
    pub fn data_key(self) -> &'static str {
        match self {
            KeyPrefix::Input => DataKeys::INPUT,
            KeyPrefix::Target => DataKeys::TARGET,
        }
    }
}

/// Fully qualified hook name, rendered as `{stage_}{key_}{base}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookName<B: HookBase> {
    pub stage: Option<RunningStage>,
    pub key: Option<KeyPrefix>,
    pub base: B,
}

impl<B: HookBase> HookName<B> {
    /// Checked constructor; key-scoped names are rejected for bases without keys
    pub fn new(stage: Option<RunningStage>, key: Option<KeyPrefix>, base: B) -> Result<Self> {
        let name = Self { stage, key, base };
        if key.is_some() && !base.allows_key() {
            return Err(KindlingError::configuration_with(
                format!("The hook '{}' cannot be scoped to a sample key.", base.base_name()),
                [name.to_string()],
            ));
        }
        Ok(name)
    }

    pub fn generic(base: B) -> Self {
        Self {
            stage: None,
            key: None,
            base,
        }
    }

    /// Stage-specialized names are more specific than generic ones
    pub fn is_specialized(&self) -> bool {
        self.stage.is_some()
    }
}

impl<B: HookBase> fmt::Display for HookName<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(stage) = self.stage {
            write!(f, "{}_", stage.prefix())?;
        }
        if let Some(key) = self.key {
            write!(f, "{}_", key.prefix())?;
        }
        f.write_str(self.base.base_name())
    }
}

impl<B: HookBase> FromStr for HookName<B> {
    type Err = KindlingError;

    fn from_str(s: &str) -> Result<Self> {
        let mut rest = s;
        let mut stage = None;
        for candidate in RunningStage::ALL {
            if let Some(stripped) = rest
                .strip_prefix(candidate.prefix())
                .and_then(|r| r.strip_prefix('_'))
            {
                stage = Some(candidate);
                rest = stripped;
                break;
            }
        }
        let mut key = None;
        for candidate in KeyPrefix::ALL {
            if let Some(stripped) = rest
                .strip_prefix(candidate.prefix())
                .and_then(|r| r.strip_prefix('_'))
            {
                key = Some(candidate);
                rest = stripped;
                break;
            }
        }
        let base = B::all()
            .iter()
            .copied()
            .find(|b| b.base_name() == rest)
            .ok_or_else(|| {
                KindlingError::configuration_with(format!("'{}' is not a known hook name.", s), [s])
            })?;
        HookName::new(stage, key, base)
    }
}

/// Outcome of looking a hook up in a [`HookTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookSlot<F> {
    Unset,
    Overridden(F),
}

impl<F> HookSlot<F> {
    pub fn is_overridden(&self) -> bool {
        matches!(self, HookSlot::Overridden(_))
    }

    pub fn into_option(self) -> Option<F> {
        match self {
            HookSlot::Unset => None,
            HookSlot::Overridden(f) => Some(f),
        }
    }
}

/// The most specific name found for a hook and whether it is overridden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedHook<B: HookBase> {
    pub name: HookName<B>,
    pub overridden: bool,
}

/// Registered overrides, keyed by hook name
#[derive(Clone)]
pub struct HookTable<B: HookBase, F> {
    overrides: IndexMap<HookName<B>, F>,
}

impl<B: HookBase, F> Default for HookTable<B, F> {
    fn default() -> Self {
        Self {
            overrides: IndexMap::new(),
        }
    }
}

impl<B: HookBase, F> fmt::Debug for HookTable<B, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

impl<B: HookBase, F> HookTable<B, F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` under `name`, returning any override it replaces
    pub fn insert(&mut self, name: HookName<B>, hook: F) -> Result<Option<F>> {
        let name = HookName::new(name.stage, name.key, name.base)?;
        Ok(self.overrides.insert(name, hook))
    }

    /// Register a hook that is not scoped to a sample key; this cannot fail
    pub fn insert_unscoped(&mut self, stage: Option<RunningStage>, base: B, hook: F) -> Option<F> {
        self.overrides.insert(
            HookName {
                stage,
                key: None,
                base,
            },
            hook,
        )
    }

    /// Register an override by its textual name, e.g. `"val_target_per_batch_transform"`
    pub fn hook(mut self, name: &str, hook: F) -> Result<Self> {
        let parsed: HookName<B> = name.parse()?;
        self.insert(parsed, hook)?;
        Ok(self)
    }

    pub fn slot(&self, name: &HookName<B>) -> HookSlot<&F> {
        match self.overrides.get(name) {
            Some(f) => HookSlot::Overridden(f),
            None => HookSlot::Unset,
        }
    }

    pub fn is_overridden(&self, name: &HookName<B>) -> bool {
        self.overrides.contains_key(name)
    }

    /// Most specific name for `base`/`key` under `stage`: the stage-specialized
    /// name if it is overridden, the generic one otherwise
    pub fn resolve(&self, base: B, key: Option<KeyPrefix>, stage: RunningStage) -> ResolvedHook<B> {
        let specialized = HookName {
            stage: Some(stage),
            key,
            base,
        };
        if self.is_overridden(&specialized) {
            return ResolvedHook {
                name: specialized,
                overridden: true,
            };
        }
        let generic = HookName {
            stage: None,
            key,
            base,
        };
        ResolvedHook {
            overridden: self.is_overridden(&generic),
            name: generic,
        }
    }

    /// Choose between the plain hook and its `key`-scoped form
    pub fn select(&self, base: B, key: KeyPrefix, stage: RunningStage) -> Result<ResolvedHook<B>> {
        let plain = self.resolve(base, None, stage);
        if !base.allows_key() {
            return Ok(plain);
        }
        let keyed = self.resolve(base, Some(key), stage);

        if plain.overridden && keyed.overridden {
            if plain.name.is_specialized() == keyed.name.is_specialized() {
                return Err(KindlingError::configuration_with(
                    format!(
                        "Only one of {} or {} can be overridden.",
                        plain.name, keyed.name
                    ),
                    [plain.name.to_string(), keyed.name.to_string()],
                ));
            }
            let (winner, shadowed) = if plain.name.is_specialized() {
                (plain, keyed)
            } else {
                (keyed, plain)
            };
            log::debug!(
                "'{}' takes precedence over '{}' for stage {}",
                winner.name,
                shadowed.name,
                stage
            );
            return Ok(winner);
        }

        Ok(if keyed.overridden { keyed } else { plain })
    }

    /// Whether any variant of `base` (generic or `stage`-specialized, plain or
    /// key-scoped) is overridden
    pub fn is_overridden_recursive(&self, base: B, stage: RunningStage) -> bool {
        self.overrides
            .keys()
            .any(|name| name.base == base && name.stage.map_or(true, |s| s == stage))
    }

    /// Names of every registered override, in registration order
    pub fn names(&self) -> Vec<String> {
        self.overrides.keys().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Table = HookTable<HookPlacement, &'static str>;

    #[test]
    fn test_hook_name_rendering() {
        let name = HookName::new(
            Some(RunningStage::Training),
            Some(KeyPrefix::Input),
            HookPlacement::PerSampleTransform,
        )
        .unwrap();
        assert_eq!(name.to_string(), "train_input_per_sample_transform");
        assert_eq!(
            HookName::generic(HookPlacement::PerBatchTransformOnDevice).to_string(),
            "per_batch_transform_on_device"
        );
    }

    #[test]
    fn test_hook_name_parsing() {
        let name: HookName<HookPlacement> = "val_target_per_batch_transform".parse().unwrap();
        assert_eq!(name.stage, Some(RunningStage::Validating));
        assert_eq!(name.key, Some(KeyPrefix::Target));
        assert_eq!(name.base, HookPlacement::PerBatchTransform);

        let name: HookName<HookPlacement> = "predict_collate".parse().unwrap();
        assert_eq!(name.stage, Some(RunningStage::Predicting));
        assert!(name.key.is_none());

        let name: HookName<HookPlacement> = "per_sample_transform_on_device".parse().unwrap();
        assert_eq!(name.base, HookPlacement::PerSampleTransformOnDevice);
    }

    #[test]
    fn test_keyed_collate_rejected() {
        let err = "input_collate".parse::<HookName<HookPlacement>>().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.mentions("input_collate"));
    }

    #[test]
    fn test_unknown_name_rejected() {
        let err = "train_per_epoch_transform"
            .parse::<HookName<HookPlacement>>()
            .unwrap_err();
        assert!(err.mentions("train_per_epoch_transform"));
    }

    #[test]
    fn test_resolve_prefers_stage_specialization() {
        let table = Table::new()
            .hook("per_sample_transform", "generic")
            .unwrap()
            .hook("train_per_sample_transform", "train")
            .unwrap();

        let train = table.resolve(HookPlacement::PerSampleTransform, None, RunningStage::Training);
        assert_eq!(train.name.to_string(), "train_per_sample_transform");
        assert!(train.overridden);

        let val = table.resolve(HookPlacement::PerSampleTransform, None, RunningStage::Validating);
        assert_eq!(val.name.to_string(), "per_sample_transform");
        assert!(val.overridden);
    }

    #[test]
    fn test_resolve_unset() {
        let table = Table::new();
        let resolved = table.resolve(HookPlacement::Collate, None, RunningStage::Testing);
        assert!(!resolved.overridden);
        assert_eq!(resolved.name.to_string(), "collate");
        assert_eq!(table.slot(&resolved.name), HookSlot::Unset);
    }

    #[test]
    fn test_select_keyed_when_only_keyed() {
        let table = Table::new()
            .hook("input_per_sample_transform", "f")
            .unwrap();
        let chosen = table
            .select(HookPlacement::PerSampleTransform, KeyPrefix::Input, RunningStage::Training)
            .unwrap();
        assert_eq!(chosen.name.to_string(), "input_per_sample_transform");

        let chosen = table
            .select(HookPlacement::PerSampleTransform, KeyPrefix::Target, RunningStage::Training)
            .unwrap();
        assert_eq!(chosen.name.to_string(), "per_sample_transform");
        assert!(!chosen.overridden);
    }

    #[test]
    fn test_select_equal_specialization_is_ambiguous() {
        let table = Table::new()
            .hook("per_sample_transform", "a")
            .unwrap()
            .hook("input_per_sample_transform", "b")
            .unwrap();
        let err = table
            .select(HookPlacement::PerSampleTransform, KeyPrefix::Input, RunningStage::Training)
            .unwrap_err();
        assert!(err.mentions("per_sample_transform"));
        assert!(err.mentions("input_per_sample_transform"));

        let table = Table::new()
            .hook("test_per_batch_transform", "a")
            .unwrap()
            .hook("test_target_per_batch_transform", "b")
            .unwrap();
        assert!(table
            .select(HookPlacement::PerBatchTransform, KeyPrefix::Target, RunningStage::Testing)
            .is_err());
    }

    #[test]
    fn test_select_specialized_wins() {
        let table = Table::new()
            .hook("train_per_sample_transform", "plain")
            .unwrap()
            .hook("input_per_sample_transform", "keyed")
            .unwrap();
        let chosen = table
            .select(HookPlacement::PerSampleTransform, KeyPrefix::Input, RunningStage::Training)
            .unwrap();
        assert_eq!(chosen.name.to_string(), "train_per_sample_transform");

        // outside training the plain hook is generic again and only the keyed one is set
        let chosen = table
            .select(HookPlacement::PerSampleTransform, KeyPrefix::Input, RunningStage::Validating)
            .unwrap();
        assert_eq!(chosen.name.to_string(), "input_per_sample_transform");
    }

    #[test]
    fn test_recursive_override_check() {
        let table = Table::new()
            .hook("val_input_per_batch_transform", "f")
            .unwrap();
        assert!(table.is_overridden_recursive(HookPlacement::PerBatchTransform, RunningStage::Validating));
        assert!(!table.is_overridden_recursive(HookPlacement::PerBatchTransform, RunningStage::Training));
        assert!(!table.is_overridden_recursive(
            HookPlacement::PerSampleTransformOnDevice,
            RunningStage::Validating
        ));
    }
}
