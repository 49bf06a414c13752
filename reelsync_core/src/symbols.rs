use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub icon: String,
    pub payout: f64, // multiplier paid when every reel shows this symbol
}

impl Symbol {
    pub fn new(name: impl Into<String>, icon: impl Into<String>, payout: f64) -> Self {
        Self {
            name: name.into(),
            icon: icon.into(),
            payout,
        }
    }
}

/// Ordered symbol table shared by every reel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SymbolSet(pub Vec<Symbol>);

impl SymbolSet {
    pub fn default_set() -> Self {
        Self(vec![
            Symbol::new("Train", "🚂", 25.0),
            Symbol::new("Block P", "🅿️", 15.0),
            Symbol::new("Boiler", "⚙️", 12.0),
            Symbol::new("Drum", "🥁", 8.0),
            Symbol::new("Hat", "🎩", 5.0),
            Symbol::new("Ticket", "🎟️", 3.0),
        ])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.0.iter()
    }

    pub fn find(&self, name: &str) -> Option<&Symbol> {
        self.0.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Maps a uniform float in [0,1) onto the table.
    pub fn pick(&self, unit: f64) -> Option<&Symbol> {
        if self.0.is_empty() {
            return None;
        }
        let idx = ((unit * self.0.len() as f64).floor() as usize).min(self.0.len() - 1);
        self.0.get(idx)
    }
}

impl Default for SymbolSet {
    fn default() -> Self {
        Self::default_set()
    }
}
