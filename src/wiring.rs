use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What is attached to a board pin
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PinKind {
    Led,
    Output,
    Input,
    Servo,
    Optocoupler,
}

impl PinKind {
    /// Pins driven by the program are configured as outputs
    pub fn is_output(self) -> bool {
        matches!(self, PinKind::Led | PinKind::Output | PinKind::Servo)
    }
}

/// A named device on a board pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringPin {
    pub pin: u32,
    pub name: String,
    pub kind: PinKind,
}

/// Pin table of the target board, ordered by pin number
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WiringTable {
    pins: BTreeMap<u32, WiringPin>,
}

impl WiringTable {
    pub fn new() -> Self {
        Self {
            pins: BTreeMap::new(),
        }
    }

    /// Attach a device to a pin, replacing whatever was there
    pub fn attach(&mut self, pin: u32, name: impl Into<String>, kind: PinKind) {
        self.pins.insert(
            pin,
            WiringPin {
                pin,
                name: name.into(),
                kind,
            },
        );
    }

    pub fn detach(&mut self, pin: u32) -> Option<WiringPin> {
        self.pins.remove(&pin)
    }

    pub fn get(&self, pin: u32) -> Option<&WiringPin> {
        self.pins.get(&pin)
    }

    pub fn pins(&self) -> impl Iterator<Item = &WiringPin> {
        self.pins.values()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// (name, pin number) options for a pin dropdown. Falls back to a
    /// single `---` placeholder so the dropdown is never empty.
    pub fn dropdown_options(&self, kind: PinKind) -> Vec<(String, String)> {
        let options: Vec<(String, String)> = self
            .pins
            .values()
            .filter(|p| p.kind == kind)
            .map(|p| (p.name.clone(), p.pin.to_string()))
            .collect();

        if options.is_empty() {
            vec![("---".to_string(), "0".to_string())]
        } else {
            options
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropdown_options_filter_by_kind() {
        let mut wiring = WiringTable::new();
        wiring.attach(2, "red", PinKind::Led);
        wiring.attach(5, "arm", PinKind::Servo);
        wiring.attach(3, "green", PinKind::Led);

        assert_eq!(
            wiring.dropdown_options(PinKind::Led),
            vec![
                ("red".to_string(), "2".to_string()),
                ("green".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn test_dropdown_placeholder_when_empty() {
        let wiring = WiringTable::new();
        assert_eq!(
            wiring.dropdown_options(PinKind::Input),
            vec![("---".to_string(), "0".to_string())]
        );
    }

    #[test]
    fn test_attach_replaces_pin() {
        let mut wiring = WiringTable::new();
        wiring.attach(4, "lamp", PinKind::Output);
        wiring.attach(4, "button", PinKind::Input);
        assert_eq!(wiring.len(), 1);
        assert_eq!(wiring.get(4).unwrap().kind, PinKind::Input);
        assert!(!PinKind::Input.is_output());
        assert!(wiring.detach(4).is_some());
        assert!(wiring.is_empty());
    }
}
