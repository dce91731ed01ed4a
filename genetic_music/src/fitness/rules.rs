// Rule database: named scoring curves and the weighted rules that use them.
//
// Functions live in a map keyed by `FunctionId`. Id 0 is the built-in
// default (a triangle peaking at 0.5 over [-10, 10]); it always exists and
// cannot be removed. Removing any other function points the rules that used
// it back at the default.
//
// Rules are stored per kind in a fixed slab of 16 slots. A `RuleId` carries
// the slot's generation, so an id kept after its rule was removed is
// rejected instead of silently addressing a newer rule.
//
// The whole set round-trips through JSON (`RuleSetFile`), which is how rule
// sets are saved, shared and loaded from the CLI.

use super::function::PiecewiseLinear;
use crate::error::GaError;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const RULES_PER_KIND: usize = 16;

/// Which feature stream of a phrase a rule scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Each run's pitch (rests score as pitch 0).
    Pitch,
    /// Each run's duration in slots.
    Rhythm,
    /// Signed semitone step between consecutive sounding notes.
    Interval,
    /// Each sounding note's distance above the root of its chord.
    Chord,
    /// Sounding note onsets per measure.
    Measure,
}

impl RuleKind {
    pub const ALL: [RuleKind; 5] = [
        RuleKind::Pitch,
        RuleKind::Rhythm,
        RuleKind::Interval,
        RuleKind::Chord,
        RuleKind::Measure,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            RuleKind::Pitch => "Pitch Rule",
            RuleKind::Rhythm => "Rhythm Rule",
            RuleKind::Interval => "Interval Rule",
            RuleKind::Chord => "Chord Rule",
            RuleKind::Measure => "Measure Rule",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u16);

pub const DEFAULT_FUNCTION: FunctionId = FunctionId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId {
    kind: RuleKind,
    slot: u8,
    generation: u16,
}

impl RuleId {
    pub fn kind(self) -> RuleKind {
        self.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub kind: RuleKind,
    pub function: FunctionId,
    /// Relative importance in [0, 1].
    pub weight: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct RuleSlot {
    generation: u16,
    rule: Option<Rule>,
}

/// On-disk form of a `RuleSet`.
#[derive(Debug, Serialize, Deserialize)]
struct RuleSetFile {
    functions: Vec<FunctionEntry>,
    rules: Vec<Rule>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionEntry {
    id: FunctionId,
    #[serde(flatten)]
    function: PiecewiseLinear,
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    functions: FxHashMap<FunctionId, PiecewiseLinear>,
    next_function: u16,
    slabs: [[RuleSlot; RULES_PER_KIND]; 5],
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

fn default_function() -> PiecewiseLinear {
    PiecewiseLinear::from_vertices("Default", [(-10, 0.0), (0, 0.5), (10, 0.0)])
}

impl RuleSet {
    /// An empty rule set holding only the default function.
    pub fn new() -> Self {
        let mut functions = FxHashMap::default();
        functions.insert(DEFAULT_FUNCTION, default_function());
        RuleSet {
            functions,
            next_function: 1,
            slabs: [[RuleSlot::default(); RULES_PER_KIND]; 5],
        }
    }

    /// A small, musically motivated starting set: one rule per kind.
    pub fn default_rules() -> Self {
        let mut set = Self::new();
        let curves: [(RuleKind, &str, &[(i32, f32)], f32); 5] = [
            (
                RuleKind::Pitch,
                "Comfortable register",
                &[(21, 0.0), (48, 0.3), (60, 1.0), (72, 1.0), (84, 0.3), (108, 0.0)],
                1.0,
            ),
            (
                RuleKind::Rhythm,
                "Mostly eighths and quarters",
                &[(1, 0.3), (2, 0.8), (4, 1.0), (8, 0.6), (16, 0.3), (64, 0.0)],
                0.5,
            ),
            (
                RuleKind::Interval,
                "Stepwise motion",
                &[(-12, 0.0), (-7, 0.2), (-2, 1.0), (0, 0.6), (2, 1.0), (7, 0.2), (12, 0.0)],
                1.0,
            ),
            (
                RuleKind::Chord,
                "Chord tones",
                &[
                    (0, 1.0),
                    (1, 0.1),
                    (2, 0.4),
                    (3, 0.7),
                    (4, 1.0),
                    (5, 0.4),
                    (6, 0.1),
                    (7, 1.0),
                    (8, 0.3),
                    (9, 0.6),
                    (10, 0.3),
                    (11, 0.2),
                ],
                0.75,
            ),
            (
                RuleKind::Measure,
                "Notes per measure",
                &[(0, 0.0), (2, 0.6), (4, 1.0), (8, 0.6), (16, 0.0)],
                0.25,
            ),
        ];
        for (kind, name, vertices, weight) in curves {
            let id = set.create_function(name);
            if let Some(function) = set.function_mut(id) {
                for &(x, y) in vertices {
                    function.add_vertex(x, y);
                }
            }
            // Slot 0 of every slab is free in a fresh set.
            set.slabs[kind.index()][0].rule = Some(Rule {
                kind,
                function: id,
                weight,
            });
        }
        set
    }

    pub fn create_function(&mut self, name: impl Into<String>) -> FunctionId {
        while self.functions.contains_key(&FunctionId(self.next_function)) {
            self.next_function = self.next_function.wrapping_add(1).max(1);
        }
        let id = FunctionId(self.next_function);
        self.next_function = self.next_function.wrapping_add(1).max(1);
        self.functions.insert(id, PiecewiseLinear::new(name));
        id
    }

    pub fn function(&self, id: FunctionId) -> Option<&PiecewiseLinear> {
        self.functions.get(&id)
    }

    pub fn function_mut(&mut self, id: FunctionId) -> Option<&mut PiecewiseLinear> {
        self.functions.get_mut(&id)
    }

    /// Function ids in ascending order.
    pub fn function_ids(&self) -> Vec<FunctionId> {
        let mut ids: Vec<_> = self.functions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Delete a function; rules using it fall back to the default.
    pub fn remove_function(&mut self, id: FunctionId) -> Result<(), GaError> {
        if id == DEFAULT_FUNCTION {
            return Err(GaError::Config("the default function cannot be removed".into()));
        }
        if self.functions.remove(&id).is_none() {
            return Err(GaError::Config(format!("no function with id {}", id.0)));
        }
        for rule in self.slabs.iter_mut().flatten().filter_map(|s| s.rule.as_mut()) {
            if rule.function == id {
                rule.function = DEFAULT_FUNCTION;
            }
        }
        Ok(())
    }

    /// Add a rule of `kind` scored by `function` (default if unknown), with
    /// full weight.
    pub fn create_rule(&mut self, kind: RuleKind, function: FunctionId) -> Result<RuleId, GaError> {
        let function = if self.functions.contains_key(&function) {
            function
        } else {
            DEFAULT_FUNCTION
        };
        let slab = &mut self.slabs[kind.index()];
        let Some(slot) = slab.iter().position(|s| s.rule.is_none()) else {
            return Err(GaError::Config(format!(
                "{} table is full ({RULES_PER_KIND} rules)",
                kind.label()
            )));
        };
        slab[slot].rule = Some(Rule {
            kind,
            function,
            weight: 1.0,
        });
        Ok(RuleId {
            kind,
            slot: slot as u8,
            generation: slab[slot].generation,
        })
    }

    fn slot(&self, id: RuleId) -> Option<&RuleSlot> {
        self.slabs[id.kind.index()]
            .get(usize::from(id.slot))
            .filter(|s| s.generation == id.generation && s.rule.is_some())
    }

    fn rule_mut(&mut self, id: RuleId) -> Result<&mut Rule, GaError> {
        self.slabs[id.kind.index()]
            .get_mut(usize::from(id.slot))
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.rule.as_mut())
            .ok_or_else(|| GaError::Config("rule id is stale or unknown".into()))
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.slot(id).and_then(|s| s.rule.as_ref())
    }

    pub fn remove_rule(&mut self, id: RuleId) -> Result<(), GaError> {
        self.rule_mut(id)?;
        let slot = &mut self.slabs[id.kind.index()][usize::from(id.slot)];
        slot.rule = None;
        slot.generation = slot.generation.wrapping_add(1);
        Ok(())
    }

    pub fn set_rule_function(&mut self, id: RuleId, function: FunctionId) -> Result<(), GaError> {
        if !self.functions.contains_key(&function) {
            return Err(GaError::Config(format!("no function with id {}", function.0)));
        }
        self.rule_mut(id)?.function = function;
        Ok(())
    }

    pub fn set_rule_weight(&mut self, id: RuleId, weight: f32) -> Result<(), GaError> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(GaError::Config(format!(
                "rule weight {weight} is outside [0, 1]"
            )));
        }
        self.rule_mut(id)?.weight = weight;
        Ok(())
    }

    pub fn rules_of(&self, kind: RuleKind) -> impl Iterator<Item = &Rule> + '_ {
        self.slabs[kind.index()].iter().filter_map(|s| s.rule.as_ref())
    }

    pub fn rule_count(&self) -> usize {
        RuleKind::ALL.iter().map(|&k| self.rules_of(k).count()).sum()
    }

    /// Mean of the rule's curve over a feature stream; 0 for an empty
    /// stream.
    pub fn score_stream(&self, rule: &Rule, stream: &[i32]) -> f32 {
        if stream.is_empty() {
            return 0.0;
        }
        let function = self
            .functions
            .get(&rule.function)
            .or_else(|| self.functions.get(&DEFAULT_FUNCTION));
        let Some(function) = function else {
            return 0.0;
        };
        let sum: f32 = stream.iter().map(|&x| function.evaluate(x)).sum();
        sum / stream.len() as f32
    }

    pub fn to_json(&self) -> Result<String, GaError> {
        let file = RuleSetFile {
            functions: self
                .function_ids()
                .into_iter()
                .filter_map(|id| {
                    self.functions.get(&id).map(|f| FunctionEntry {
                        id,
                        function: f.clone(),
                    })
                })
                .collect(),
            rules: RuleKind::ALL
                .iter()
                .flat_map(|&k| self.rules_of(k).copied())
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn from_json(json: &str) -> Result<Self, GaError> {
        let file: RuleSetFile = serde_json::from_str(json)?;
        let mut set = Self::new();
        for entry in file.functions {
            let mut function = entry.function;
            function.sort();
            set.functions.insert(entry.id, function);
            if entry.id.0 >= set.next_function {
                set.next_function = entry.id.0.wrapping_add(1).max(1);
            }
        }
        for rule in file.rules {
            if !(0.0..=1.0).contains(&rule.weight) {
                return Err(GaError::Config(format!(
                    "rule weight {} is outside [0, 1]",
                    rule.weight
                )));
            }
            let id = set.create_rule(rule.kind, rule.function)?;
            set.rule_mut(id)?.weight = rule.weight;
        }
        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self, GaError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), GaError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_function_always_present() {
        let mut set = RuleSet::new();
        let f = set.function(DEFAULT_FUNCTION).unwrap();
        assert_eq!(f.evaluate(0), 0.5);
        assert!(set.remove_function(DEFAULT_FUNCTION).is_err());
    }

    #[test]
    fn removing_a_function_reverts_rules_to_default() {
        let mut set = RuleSet::new();
        let f = set.create_function("flat");
        let rule = set.create_rule(RuleKind::Pitch, f).unwrap();
        assert_eq!(set.rule(rule).unwrap().function, f);
        set.remove_function(f).unwrap();
        assert_eq!(set.rule(rule).unwrap().function, DEFAULT_FUNCTION);
        assert!(set.remove_function(f).is_err());
    }

    #[test]
    fn unknown_function_falls_back_on_create() {
        let mut set = RuleSet::new();
        let rule = set.create_rule(RuleKind::Rhythm, FunctionId(77)).unwrap();
        assert_eq!(set.rule(rule).unwrap().function, DEFAULT_FUNCTION);
    }

    #[test]
    fn slab_holds_sixteen_rules_per_kind() {
        let mut set = RuleSet::new();
        for _ in 0..RULES_PER_KIND {
            set.create_rule(RuleKind::Interval, DEFAULT_FUNCTION).unwrap();
        }
        assert!(set.create_rule(RuleKind::Interval, DEFAULT_FUNCTION).is_err());
        assert!(set.create_rule(RuleKind::Chord, DEFAULT_FUNCTION).is_ok());
        assert_eq!(set.rule_count(), RULES_PER_KIND + 1);
    }

    #[test]
    fn stale_rule_ids_are_rejected() {
        let mut set = RuleSet::new();
        let old = set.create_rule(RuleKind::Measure, DEFAULT_FUNCTION).unwrap();
        set.remove_rule(old).unwrap();
        let new = set.create_rule(RuleKind::Measure, DEFAULT_FUNCTION).unwrap();
        assert_ne!(old, new);
        assert!(set.rule(old).is_none());
        assert!(set.remove_rule(old).is_err());
        assert!(set.set_rule_weight(old, 0.5).is_err());
        assert!(set.rule(new).is_some());
    }

    #[test]
    fn weights_must_be_in_unit_range() {
        let mut set = RuleSet::new();
        let rule = set.create_rule(RuleKind::Pitch, DEFAULT_FUNCTION).unwrap();
        assert!(set.set_rule_weight(rule, 1.5).is_err());
        assert!(set.set_rule_weight(rule, -0.1).is_err());
        set.set_rule_weight(rule, 0.25).unwrap();
        assert_eq!(set.rule(rule).unwrap().weight, 0.25);
    }

    #[test]
    fn stream_score_is_mean_of_curve() {
        let mut set = RuleSet::new();
        let id = set.create_rule(RuleKind::Interval, DEFAULT_FUNCTION).unwrap();
        let rule = *set.rule(id).unwrap();
        assert_eq!(set.score_stream(&rule, &[0, 10, -5]), (0.5 + 0.0 + 0.25) / 3.0);
        assert_eq!(set.score_stream(&rule, &[]), 0.0);
    }

    #[test]
    fn json_round_trip_preserves_behaviour() {
        let set = RuleSet::default_rules();
        assert_eq!(set.rule_count(), 5);
        let json = set.to_json().unwrap();
        let back = RuleSet::from_json(&json).unwrap();
        assert_eq!(back.rule_count(), 5);
        assert_eq!(back.function_ids(), set.function_ids());
        for kind in RuleKind::ALL {
            let a: Vec<_> = set.rules_of(kind).copied().collect();
            let b: Vec<_> = back.rules_of(kind).copied().collect();
            assert_eq!(a, b);
        }
        // New functions do not collide with loaded ids.
        let mut back = back;
        let fresh = back.create_function("new");
        assert!(!set.function_ids().contains(&fresh));
    }

    #[test]
    fn default_rules_carry_their_weights_and_curves() {
        let set = RuleSet::default_rules();
        let weights: Vec<f32> = RuleKind::ALL
            .iter()
            .flat_map(|&k| set.rules_of(k).map(|r| r.weight))
            .collect();
        assert_eq!(weights, vec![1.0, 0.5, 1.0, 0.75, 0.25]);
        for kind in RuleKind::ALL {
            let rule = set.rules_of(kind).next().unwrap();
            assert_ne!(rule.function, DEFAULT_FUNCTION);
            assert!(set.function(rule.function).is_some());
        }
    }

    #[test]
    fn json_rejects_bad_weights() {
        let json = r#"{"functions":[],"rules":[{"kind":"pitch","function":0,"weight":3.0}]}"#;
        assert!(RuleSet::from_json(json).is_err());
    }
}
