//! Binding engine: controller messages → learned bindings or value updates

use tracing::{debug, info, trace};

use super::table::{BindingDescriptor, BindingKind, BindingTable};
use crate::error::BindingError;
use crate::fixable::{flatten_configs, FixableConfig, FixableId, FixableValue, NamedConfigs};
use crate::midi::{ControllerMessage, Voice};

/// Outstanding learn request
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTrigger {
    pub target: FixableId,
    pub kind: BindingKind,
    toggle_phase: bool,
}

/// Result of feeding one controller message to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum BindingOutcome {
    /// Learn mode captured the message
    Bound {
        number: u8,
        descriptor: BindingDescriptor,
        replaced: Option<BindingDescriptor>,
    },
    /// Learn mode is waiting for a different kind of input
    Incompatible { kind: BindingKind, voice: Voice },
    /// A bound input produced a new value
    Update { id: FixableId, value: FixableValue },
    /// A bound input did not apply (wrong voice or target kind)
    Dropped,
    /// Nothing is bound to this input
    Unbound,
}

/// Map a 7-bit controller value onto `[min, max]`
///
/// Both ends are exact.
pub fn stepper_value(min: f32, max: f32, data: u8) -> f32 {
    if data >= 127 {
        max
    } else {
        min + (max - min) * data as f32 / 127.0
    }
}

/// Owns the binding table and the learn-mode trigger
#[derive(Debug, Default)]
pub struct BindingEngine {
    table: BindingTable,
    /// Flat view of the session configs, for kind and range checks
    configs: NamedConfigs,
    pending: Option<PendingTrigger>,
}

impl BindingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the config lookup with the flat entries of `configs`
    pub fn apply_configs<'a, I>(&mut self, configs: I)
    where
        I: IntoIterator<Item = (&'a FixableId, &'a FixableConfig)>,
    {
        self.configs = flatten_configs(configs);
        debug!("Binding engine tracks {} fixables", self.configs.len());
    }

    /// Enter learn mode for `target`, inferring the binding kind from its config
    pub fn start_binding(&mut self, target: FixableId) -> Result<BindingKind, BindingError> {
        let config = self
            .configs
            .get(&target)
            .ok_or_else(|| BindingError::UnknownFixable(target.clone()))?;
        let kind = BindingKind::infer(config.kind()).ok_or_else(|| BindingError::Unbindable {
            id: target.clone(),
            kind: config.kind(),
        })?;
        self.start_binding_as(target, kind, false)?;
        Ok(kind)
    }

    /// Enter learn mode with an explicit binding kind
    ///
    /// `toggle_phase` seeds the phase of a toggle binding and is ignored for
    /// the other kinds.
    pub fn start_binding_as(
        &mut self,
        target: FixableId,
        kind: BindingKind,
        toggle_phase: bool,
    ) -> Result<(), BindingError> {
        let config = self
            .configs
            .get(&target)
            .ok_or_else(|| BindingError::UnknownFixable(target.clone()))?;
        if config.kind() != kind.target_kind() {
            return Err(BindingError::KindMismatch {
                id: target,
                kind: config.kind(),
                binding: kind,
            });
        }

        info!("Waiting for controller input to bind {} as {}", target, kind);
        self.pending = Some(PendingTrigger {
            target,
            kind,
            toggle_phase,
        });
        Ok(())
    }

    /// Leave learn mode, returning the abandoned target
    pub fn cancel_binding(&mut self) -> Option<FixableId> {
        let cancelled = self.pending.take().map(|p| p.target);
        if let Some(id) = &cancelled {
            info!("Cancelled binding for {}", id);
        }
        cancelled
    }

    pub fn pending(&self) -> Option<&PendingTrigger> {
        self.pending.as_ref()
    }

    /// Install a binding directly, e.g. from configuration
    pub fn bind(&mut self, number: u8, descriptor: BindingDescriptor) -> Option<BindingDescriptor> {
        info!("Binding input {} to {}", number, descriptor);
        self.table.insert(number, descriptor)
    }

    pub fn unbind(&mut self, number: u8) -> Option<BindingDescriptor> {
        let removed = self.table.remove(number);
        if let Some(descriptor) = &removed {
            info!("Unbinding input {} from {}", number, descriptor);
        }
        removed
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.table
    }

    /// Feed one controller message
    pub fn process(&mut self, message: &ControllerMessage) -> BindingOutcome {
        if let Some(trigger) = self.pending.clone() {
            return self.learn(message, trigger);
        }

        let Some(descriptor) = self.table.get_mut(message.number) else {
            trace!("No binding for {}", message);
            return BindingOutcome::Unbound;
        };

        let outcome = match descriptor {
            BindingDescriptor::Stepper(id) => {
                if !matches!(message.voice, Voice::Control | Voice::PitchBend) {
                    return BindingOutcome::Dropped;
                }
                match self.configs.get(id).and_then(|c| c.range()) {
                    Some((min, max)) => BindingOutcome::Update {
                        id: id.clone(),
                        value: FixableValue::Float(stepper_value(min, max, message.data)),
                    },
                    None => BindingOutcome::Dropped,
                }
            }
            BindingDescriptor::Toggle { id, on } => {
                if !message.is_release() || !is_bool(&self.configs, id) {
                    return BindingOutcome::Dropped;
                }
                *on = !*on;
                BindingOutcome::Update {
                    id: id.clone(),
                    value: FixableValue::Bool(*on),
                }
            }
            BindingDescriptor::Hold(id) => {
                let pressed = if message.is_press() {
                    true
                } else if message.is_release() {
                    false
                } else {
                    return BindingOutcome::Dropped;
                };
                if !is_bool(&self.configs, id) {
                    return BindingOutcome::Dropped;
                }
                BindingOutcome::Update {
                    id: id.clone(),
                    value: FixableValue::Bool(pressed),
                }
            }
            BindingDescriptor::Event(id) => {
                if !message.is_press() || !is_bool(&self.configs, id) {
                    return BindingOutcome::Dropped;
                }
                BindingOutcome::Update {
                    id: id.clone(),
                    value: FixableValue::Bool(true),
                }
            }
        };

        if let BindingOutcome::Update { id, value } = &outcome {
            trace!("{} → {} = {}", message, id, value);
        }
        outcome
    }

    fn learn(&mut self, message: &ControllerMessage, trigger: PendingTrigger) -> BindingOutcome {
        if !trigger.kind.accepts_voice(message.voice) {
            debug!(
                "Incompatible bind: {} to {} (still waiting)",
                trigger.kind, message.voice
            );
            return BindingOutcome::Incompatible {
                kind: trigger.kind,
                voice: message.voice,
            };
        }

        let descriptor = BindingDescriptor::new(trigger.kind, trigger.target, trigger.toggle_phase);
        info!("Binding {} {} to {}", message.voice, message.number, descriptor);
        let replaced = self.table.insert(message.number, descriptor.clone());
        self.pending = None;

        BindingOutcome::Bound {
            number: message.number,
            descriptor,
            replaced,
        }
    }
}

fn is_bool(configs: &NamedConfigs, id: &FixableId) -> bool {
    matches!(configs.get(id), Some(FixableConfig::Bool { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixable::FixableDisplay;
    use proptest::prelude::*;

    fn configs() -> Vec<(FixableId, FixableConfig)> {
        vec![
            (
                FixableId::new("geometry"),
                FixableConfig::Group {
                    contents: vec![(
                        FixableId::new("size"),
                        FixableConfig::Float {
                            min: 10.0,
                            max: 150.0,
                            display: FixableDisplay::new("Size", 1),
                        },
                    )],
                    display: FixableDisplay::new("Geometry", 0),
                },
            ),
            (
                FixableId::new("open"),
                FixableConfig::Bool {
                    display: FixableDisplay::new("Open", 2),
                },
            ),
            (
                FixableId::new("tint"),
                FixableConfig::Color {
                    display: FixableDisplay::new("Tint", 3),
                },
            ),
        ]
    }

    fn engine() -> BindingEngine {
        let configs = configs();
        let mut engine = BindingEngine::new();
        engine.apply_configs(configs.iter().map(|(id, c)| (id, c)));
        engine
    }

    fn cc(number: u8, data: u8) -> ControllerMessage {
        ControllerMessage::new(Voice::Control, number, data)
    }

    fn note_on(number: u8) -> ControllerMessage {
        ControllerMessage::new(Voice::NoteOn, number, 100)
    }

    fn note_off(number: u8) -> ControllerMessage {
        ControllerMessage::new(Voice::NoteOff, number, 0)
    }

    fn float_of(outcome: BindingOutcome) -> f32 {
        match outcome {
            BindingOutcome::Update {
                value: FixableValue::Float(v),
                ..
            } => v,
            other => panic!("expected float update, got {:?}", other),
        }
    }

    fn bool_of(outcome: BindingOutcome) -> bool {
        match outcome {
            BindingOutcome::Update {
                value: FixableValue::Bool(b),
                ..
            } => b,
            other => panic!("expected bool update, got {:?}", other),
        }
    }

    #[test]
    fn test_learn_float_with_control_change() {
        let mut engine = engine();
        assert_eq!(
            engine.start_binding(FixableId::new("size")),
            Ok(BindingKind::Stepper)
        );

        let outcome = engine.process(&cc(9, 0));
        assert_eq!(
            outcome,
            BindingOutcome::Bound {
                number: 9,
                descriptor: BindingDescriptor::Stepper(FixableId::new("size")),
                replaced: None,
            }
        );
        assert!(engine.pending().is_none());
    }

    #[test]
    fn test_learn_ignores_incompatible_voice() {
        let mut engine = engine();
        engine.start_binding(FixableId::new("size")).unwrap();

        let outcome = engine.process(&note_on(21));
        assert_eq!(
            outcome,
            BindingOutcome::Incompatible {
                kind: BindingKind::Stepper,
                voice: Voice::NoteOn,
            }
        );
        assert!(engine.pending().is_some());
        assert!(engine.bindings().is_empty());
    }

    #[test]
    fn test_learn_captures_only_once() {
        let mut engine = engine();
        engine.start_binding(FixableId::new("size")).unwrap();
        engine.process(&cc(9, 10));

        // Second message dispatches instead of rebinding
        let value = float_of(engine.process(&cc(9, 127)));
        assert_eq!(value, 150.0);
    }

    #[test]
    fn test_learn_rejects_unbindable_targets() {
        let mut engine = engine();
        assert_eq!(
            engine.start_binding(FixableId::new("tint")),
            Err(BindingError::Unbindable {
                id: FixableId::new("tint"),
                kind: crate::fixable::FixableKind::Color,
            })
        );
        assert!(matches!(
            engine.start_binding(FixableId::new("nope")),
            Err(BindingError::UnknownFixable(_))
        ));
        assert!(matches!(
            engine.start_binding_as(FixableId::new("size"), BindingKind::Toggle, false),
            Err(BindingError::KindMismatch { .. })
        ));
        assert!(engine.pending().is_none());
    }

    #[test]
    fn test_cancel_binding() {
        let mut engine = engine();
        engine.start_binding(FixableId::new("open")).unwrap();
        assert_eq!(engine.cancel_binding(), Some(FixableId::new("open")));
        assert_eq!(engine.process(&note_on(21)), BindingOutcome::Unbound);
    }

    #[test]
    fn test_stepper_scenario_size() {
        let mut engine = engine();
        engine.bind(9, BindingDescriptor::Stepper(FixableId::new("size")));

        let value = float_of(engine.process(&cc(9, 64)));
        assert!((value - 80.55).abs() < 0.1, "got {}", value);
        assert_eq!(float_of(engine.process(&cc(9, 0))), 10.0);
        assert_eq!(float_of(engine.process(&cc(9, 127))), 150.0);
    }

    #[test]
    fn test_stepper_reads_range_at_dispatch_time() {
        let mut engine = engine();
        engine.bind(9, BindingDescriptor::Stepper(FixableId::new("size")));

        let narrowed = vec![(
            FixableId::new("size"),
            FixableConfig::Float {
                min: 0.0,
                max: 1.0,
                display: FixableDisplay::new("Size", 1),
            },
        )];
        engine.apply_configs(narrowed.iter().map(|(id, c)| (id, c)));

        assert_eq!(float_of(engine.process(&cc(9, 127))), 1.0);
    }

    #[test]
    fn test_stepper_ignores_note_voices() {
        let mut engine = engine();
        engine.bind(9, BindingDescriptor::Stepper(FixableId::new("size")));
        assert_eq!(engine.process(&note_on(9)), BindingOutcome::Dropped);
    }

    #[test]
    fn test_hold_mirrors_press_and_release() {
        let mut engine = engine();
        engine.bind(21, BindingDescriptor::Hold(FixableId::new("open")));

        assert!(bool_of(engine.process(&note_on(21))));
        assert!(!bool_of(engine.process(&note_off(21))));
        assert_eq!(engine.process(&cc(21, 5)), BindingOutcome::Dropped);
    }

    #[test]
    fn test_toggle_flips_on_release_only() {
        let mut engine = engine();
        engine.bind(
            30,
            BindingDescriptor::Toggle {
                id: FixableId::new("open"),
                on: false,
            },
        );

        assert_eq!(engine.process(&note_on(30)), BindingOutcome::Dropped);
        assert!(bool_of(engine.process(&note_off(30))));
        // No press in between, phase still alternates
        assert!(!bool_of(engine.process(&note_off(30))));
        assert!(bool_of(engine.process(&note_off(30))));
    }

    #[test]
    fn test_toggle_learned_with_current_phase() {
        let mut engine = engine();
        engine
            .start_binding_as(FixableId::new("open"), BindingKind::Toggle, true)
            .unwrap();
        engine.process(&note_on(30));

        assert!(!bool_of(engine.process(&note_off(30))));
    }

    #[test]
    fn test_event_fires_on_every_press() {
        let mut engine = engine();
        engine.bind(40, BindingDescriptor::Event(FixableId::new("open")));

        assert!(bool_of(engine.process(&note_on(40))));
        assert!(bool_of(engine.process(&note_on(40))));
        assert_eq!(engine.process(&note_off(40)), BindingOutcome::Dropped);
    }

    #[test]
    fn test_stale_binding_is_dropped() {
        let mut engine = engine();
        engine.bind(21, BindingDescriptor::Hold(FixableId::new("open")));

        let retyped = vec![(
            FixableId::new("open"),
            FixableConfig::Float {
                min: 0.0,
                max: 1.0,
                display: FixableDisplay::new("Open", 0),
            },
        )];
        engine.apply_configs(retyped.iter().map(|(id, c)| (id, c)));

        assert_eq!(engine.process(&note_on(21)), BindingOutcome::Dropped);
    }

    #[test]
    fn test_unbound_input_is_noop() {
        let mut engine = engine();
        assert_eq!(engine.process(&cc(99, 3)), BindingOutcome::Unbound);
    }

    proptest! {
        #[test]
        fn prop_stepper_exact_ends_and_monotonic(
            min in -1000.0f32..1000.0,
            span in 0.0f32..1000.0,
            data in 0u8..127,
        ) {
            let max = min + span;
            prop_assert_eq!(stepper_value(min, max, 0), min);
            prop_assert_eq!(stepper_value(min, max, 127), max);
            prop_assert!(stepper_value(min, max, data) <= stepper_value(min, max, data + 1));
        }
    }
}
