//! Differential-drive motor actuator.
//!
//! Each side of the tank is an H-bridge channel with one enable line and two
//! direction lines.  A command is translated into a complete pin sequence
//! (see [`pin_sequence`]) and written in one go, without diffing against the
//! previous state:
//!
//! | Command  | Left (in1, in2) | Right (in1, in2) |
//! |----------|-----------------|------------------|
//! | forward  | (high, low)     | (high, low)      |
//! | backward | (low, high)     | (low, high)      |
//! | left     | (low, high)     | (high, low)      |
//! | right    | (high, low)     | (low, high)      |
//! | stop     | both enable lines low, direction lines untouched |
//!
//! The pin bank sits behind a fair mutex that is held only for the writes of
//! one sequence.  Whichever call takes the lock last owns the pins, and a
//! stop from the safety watchdog is never queued behind more than one short
//! sequence.

use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tankos_types::{Backend, MotorCommand, MotorState, TankError};
use tracing::{debug, error, info, warn};

/// Logic level of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

/// A set of output lines addressed by BCM pin number.
pub trait PinBank: Send {
    fn backend(&self) -> Backend;

    /// Drive `pin` to `level`.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::HardwareFault`] if the line cannot be written.
    fn write(&mut self, pin: u8, level: Level) -> Result<(), TankError>;
}

/// Pins of one H-bridge channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidePins {
    pub en: u8,
    pub in1: u8,
    pub in2: u8,
}

/// Pin assignment for both drive sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorPins {
    pub left: SidePins,
    pub right: SidePins,
}

impl Default for MotorPins {
    fn default() -> Self {
        Self {
            left: SidePins {
                en: 13,
                in1: 26,
                in2: 19,
            },
            right: SidePins {
                en: 21,
                in1: 16,
                in2: 20,
            },
        }
    }
}

impl MotorPins {
    /// Every pin in use, enable lines first.
    pub fn all(&self) -> [u8; 6] {
        [
            self.left.en,
            self.right.en,
            self.left.in1,
            self.left.in2,
            self.right.in1,
            self.right.in2,
        ]
    }
}

/// Direction-line levels `(left (in1, in2), right (in1, in2))` for a
/// directional command; `None` for [`MotorCommand::Stop`].
pub fn direction_levels(command: MotorCommand) -> Option<((Level, Level), (Level, Level))> {
    use Level::{High, Low};
    match command {
        MotorCommand::Forward => Some(((High, Low), (High, Low))),
        MotorCommand::Backward => Some(((Low, High), (Low, High))),
        MotorCommand::Left => Some(((Low, High), (High, Low))),
        MotorCommand::Right => Some(((High, Low), (Low, High))),
        MotorCommand::Stop => None,
    }
}

/// The full, self-contained list of pin writes for `command`.
pub fn pin_sequence(pins: &MotorPins, command: MotorCommand) -> Vec<(u8, Level)> {
    match direction_levels(command) {
        Some(((l1, l2), (r1, r2))) => vec![
            (pins.left.en, Level::High),
            (pins.left.in1, l1),
            (pins.left.in2, l2),
            (pins.right.en, Level::High),
            (pins.right.in1, r1),
            (pins.right.in2, r2),
        ],
        None => vec![(pins.left.en, Level::Low), (pins.right.en, Level::Low)],
    }
}

/// Drive contract shared by the safety watchdog and the control gateway.
///
/// Calls are never queued: the most recent call's pin writes win.
pub trait Drive: Send + Sync {
    /// Apply `command` to the drive.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::HardwareFault`] if a pin write fails.
    fn execute(&self, command: MotorCommand) -> Result<(), TankError>;

    /// The command most recently applied.
    fn state(&self) -> MotorState;

    fn backend(&self) -> Backend;

    fn forward(&self) -> Result<(), TankError> {
        self.execute(MotorCommand::Forward)
    }

    fn backward(&self) -> Result<(), TankError> {
        self.execute(MotorCommand::Backward)
    }

    fn left(&self) -> Result<(), TankError> {
        self.execute(MotorCommand::Left)
    }

    fn right(&self) -> Result<(), TankError> {
        self.execute(MotorCommand::Right)
    }

    /// Deassert both enable lines.  Idempotent.
    fn stop(&self) -> Result<(), TankError> {
        self.execute(MotorCommand::Stop)
    }
}

struct ActuatorInner {
    bank: Box<dyn PinBank>,
    state: MotorState,
}

/// [`Drive`] implementation over a [`PinBank`].
pub struct MotorActuator {
    pins: MotorPins,
    backend: Backend,
    inner: Mutex<ActuatorInner>,
}

impl MotorActuator {
    /// Wrap `bank` and immediately deassert both enable lines.
    pub fn new(pins: MotorPins, bank: Box<dyn PinBank>) -> Self {
        let backend = bank.backend();
        let actuator = Self {
            pins,
            backend,
            inner: Mutex::new(ActuatorInner {
                bank,
                state: MotorState::stopped(),
            }),
        };
        if let Err(e) = actuator.stop() {
            warn!(error = %e, "initial motor stop failed");
        }
        info!(%backend, ?pins, "motor actuator initialised");
        actuator
    }

    pub fn pins(&self) -> &MotorPins {
        &self.pins
    }

    fn write_sequence(bank: &mut dyn PinBank, sequence: &[(u8, Level)]) -> Result<(), TankError> {
        for &(pin, level) in sequence {
            bank.write(pin, level)?;
        }
        Ok(())
    }

    // Write every enable line low, even if one of them fails.
    fn release_enables(&self, bank: &mut dyn PinBank) -> Result<(), TankError> {
        let mut first_error = None;
        for pin in [self.pins.left.en, self.pins.right.en] {
            if let Err(e) = bank.write(pin, Level::Low) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drive for MotorActuator {
    fn execute(&self, command: MotorCommand) -> Result<(), TankError> {
        let sequence = pin_sequence(&self.pins, command);

        let mut inner = self.inner.lock();
        let result = if command.is_directional() {
            // Never leave a half-applied direction with the bridge enabled.
            match Self::write_sequence(inner.bank.as_mut(), &sequence) {
                Ok(()) => Ok(()),
                Err(e) => match self.release_enables(inner.bank.as_mut()) {
                    Ok(()) => Err(e),
                    Err(release) => {
                        error!(%command, error = %e, release_error = %release, "enable lines may still be asserted");
                        Err(TankError::HardwareFault {
                            component: "motor".to_string(),
                            details: format!("{e}; releasing enables also failed: {release}"),
                        })
                    }
                },
            }
        } else {
            self.release_enables(inner.bank.as_mut())
        };
        if result.is_ok() {
            inner.state = MotorState {
                current_command: command,
                issued_at: Instant::now(),
            };
        }
        drop(inner);

        match &result {
            Ok(()) => debug!(%command, backend = %self.backend, "motor command applied"),
            Err(e) => warn!(%command, error = %e, "motor command failed"),
        }
        result
    }

    fn state(&self) -> MotorState {
        self.inner.lock().state
    }

    fn backend(&self) -> Backend {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Records every write into shared state the test can inspect.
    #[derive(Clone, Default)]
    struct MockBank {
        levels: Arc<Mutex<HashMap<u8, Level>>>,
        writes: Arc<Mutex<Vec<(u8, Level)>>>,
        fail_pins: Vec<u8>,
    }

    impl MockBank {
        fn level(&self, pin: u8) -> Option<Level> {
            self.levels.lock().get(&pin).copied()
        }
    }

    impl PinBank for MockBank {
        fn backend(&self) -> Backend {
            Backend::Stub
        }

        fn write(&mut self, pin: u8, level: Level) -> Result<(), TankError> {
            if self.fail_pins.contains(&pin) {
                return Err(TankError::HardwareFault {
                    component: format!("gpio{pin}"),
                    details: "line busy".to_string(),
                });
            }
            self.levels.lock().insert(pin, level);
            self.writes.lock().push((pin, level));
            Ok(())
        }
    }

    fn actuator() -> (MotorActuator, MockBank) {
        let bank = MockBank::default();
        let act = MotorActuator::new(MotorPins::default(), Box::new(bank.clone()));
        (act, bank)
    }

    #[test]
    fn new_actuator_starts_with_enables_low() {
        let (act, bank) = actuator();
        let pins = MotorPins::default();
        assert_eq!(bank.level(pins.left.en), Some(Level::Low));
        assert_eq!(bank.level(pins.right.en), Some(Level::Low));
        assert_eq!(act.state().current_command, MotorCommand::Stop);
    }

    #[test]
    fn directional_commands_match_direction_table() {
        use Level::{High, Low};
        let expected = [
            (MotorCommand::Forward, (High, Low), (High, Low)),
            (MotorCommand::Backward, (Low, High), (Low, High)),
            (MotorCommand::Left, (Low, High), (High, Low)),
            (MotorCommand::Right, (High, Low), (Low, High)),
        ];
        let pins = MotorPins::default();
        for (command, left, right) in expected {
            let (act, bank) = actuator();
            act.execute(command).unwrap();
            assert_eq!(bank.level(pins.left.en), Some(High), "{command}");
            assert_eq!(bank.level(pins.right.en), Some(High), "{command}");
            assert_eq!((bank.level(pins.left.in1), bank.level(pins.left.in2)), (Some(left.0), Some(left.1)), "{command}");
            assert_eq!(
                (bank.level(pins.right.in1), bank.level(pins.right.in2)),
                (Some(right.0), Some(right.1)),
                "{command}"
            );
            assert_eq!(act.state().current_command, command);
        }
    }

    #[test]
    fn stop_after_any_direction_deasserts_both_enables() {
        let pins = MotorPins::default();
        for command in [
            MotorCommand::Forward,
            MotorCommand::Backward,
            MotorCommand::Left,
            MotorCommand::Right,
        ] {
            let (act, bank) = actuator();
            act.execute(command).unwrap();
            act.stop().unwrap();
            assert_eq!(bank.level(pins.left.en), Some(Level::Low), "{command}");
            assert_eq!(bank.level(pins.right.en), Some(Level::Low), "{command}");
            assert_eq!(act.state().current_command, MotorCommand::Stop);
        }
    }

    #[test]
    fn stop_only_touches_enable_lines() {
        let pins = MotorPins::default();
        let seq = pin_sequence(&pins, MotorCommand::Stop);
        assert_eq!(seq, vec![(pins.left.en, Level::Low), (pins.right.en, Level::Low)]);
    }

    #[test]
    fn directional_sequence_is_complete_regardless_of_previous_state() {
        let (act, bank) = actuator();
        act.forward().unwrap();
        bank.writes.lock().clear();
        // Same command again: all six lines are rewritten, nothing is diffed.
        act.forward().unwrap();
        assert_eq!(bank.writes.lock().len(), 6);
    }

    #[test]
    fn repeated_stop_is_harmless() {
        let (act, bank) = actuator();
        act.stop().unwrap();
        act.stop().unwrap();
        assert_eq!(bank.level(MotorPins::default().left.en), Some(Level::Low));
    }

    #[test]
    fn failed_direction_write_releases_enables() {
        let pins = MotorPins::default();
        let bank = MockBank {
            fail_pins: vec![pins.right.in1],
            ..MockBank::default()
        };
        let act = MotorActuator::new(pins, Box::new(bank.clone()));
        let err = act.forward().unwrap_err();
        assert!(matches!(err, TankError::HardwareFault { .. }));
        assert_eq!(bank.level(pins.left.en), Some(Level::Low));
        assert_eq!(bank.level(pins.right.en), Some(Level::Low));
        // A failed command does not update the recorded state.
        assert_eq!(act.state().current_command, MotorCommand::Stop);
    }

    #[test]
    fn failed_release_after_failed_direction_is_reported() {
        let pins = MotorPins::default();
        let bank = MockBank {
            fail_pins: vec![pins.right.in1, pins.right.en],
            ..MockBank::default()
        };
        let act = MotorActuator::new(pins, Box::new(bank.clone()));
        let err = act.forward().unwrap_err();
        match err {
            TankError::HardwareFault { component, details } => {
                assert_eq!(component, "motor");
                assert!(details.contains("releasing enables also failed"), "{details}");
                assert!(details.contains(&format!("gpio{}", pins.right.en)), "{details}");
            }
            other => panic!("unexpected error: {other}"),
        }
        // The healthy side is still released.
        assert_eq!(bank.level(pins.left.en), Some(Level::Low));
        assert_eq!(act.state().current_command, MotorCommand::Stop);
    }

    #[test]
    fn last_call_wins_under_contention() {
        let (act, bank) = actuator();
        let act = Arc::new(act);
        let flooders: Vec<_> = (0..4)
            .map(|_| {
                let act = Arc::clone(&act);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        act.forward().unwrap();
                    }
                })
            })
            .collect();
        for f in flooders {
            f.join().unwrap();
        }
        act.stop().unwrap();
        let pins = MotorPins::default();
        assert_eq!(bank.level(pins.left.en), Some(Level::Low));
        assert_eq!(bank.level(pins.right.en), Some(Level::Low));
    }

    #[test]
    fn motor_pins_deserialize_from_toml_with_defaults() {
        let pins: MotorPins = toml::from_str("[left]\nen = 1\nin1 = 2\nin2 = 3\n").unwrap();
        assert_eq!(pins.left, SidePins { en: 1, in1: 2, in2: 3 });
        assert_eq!(pins.right, MotorPins::default().right);
    }
}
