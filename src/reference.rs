use serde::Serialize;

/// Coarse speed classification of a circuit, fed to the model as a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackCategory {
    Slow,
    Medium,
    Fast,
}

impl TrackCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackCategory::Slow => "slow",
            TrackCategory::Medium => "medium",
            TrackCategory::Fast => "fast",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Circuit {
    pub name: &'static str,
    #[serde(rename = "length")]
    pub length_km: f64,
    #[serde(rename = "type")]
    pub category: TrackCategory,
    #[serde(rename = "baseline")]
    pub baseline_lap_seconds: f64,
}

const fn circuit(
    name: &'static str,
    length_km: f64,
    category: TrackCategory,
    baseline_lap_seconds: f64,
) -> Circuit {
    Circuit {
        name,
        length_km,
        category,
        baseline_lap_seconds,
    }
}

// Shared by the server and the trainer; any edit here changes the model inputs.
pub static CIRCUITS: [Circuit; 16] = [
    circuit("Monaco", 3.337, TrackCategory::Slow, 72.0),
    circuit("Bahrain", 5.412, TrackCategory::Medium, 87.0),
    circuit("Jeddah", 6.174, TrackCategory::Fast, 80.0),
    circuit("Melbourne", 5.278, TrackCategory::Medium, 81.0),
    circuit("Imola", 4.909, TrackCategory::Medium, 78.0),
    circuit("Barcelona", 4.657, TrackCategory::Medium, 77.0),
    circuit("Silverstone", 5.891, TrackCategory::Fast, 83.0),
    circuit("Hungary", 4.381, TrackCategory::Slow, 78.0),
    circuit("Spa", 7.004, TrackCategory::Fast, 104.0),
    circuit("Zandvoort", 4.259, TrackCategory::Medium, 73.0),
    circuit("Monza", 5.793, TrackCategory::Fast, 80.0),
    circuit("Suzuka", 5.807, TrackCategory::Fast, 90.0),
    circuit("Austin", 5.513, TrackCategory::Medium, 92.0),
    circuit("Mexico", 4.304, TrackCategory::Medium, 79.0),
    circuit("Brazil", 4.309, TrackCategory::Medium, 72.0),
    circuit("Abu Dhabi", 5.281, TrackCategory::Medium, 91.0),
];

/// Exact, case-sensitive lookup by circuit name.
pub fn find_circuit(name: &str) -> Option<&'static Circuit> {
    CIRCUITS.iter().find(|c| c.name == name)
}

pub fn circuit_names() -> Vec<&'static str> {
    CIRCUITS.iter().map(|c| c.name).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverTier {
    S,
    A,
    B,
    C,
}

impl DriverTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverTier::S => "S",
            DriverTier::A => "A",
            DriverTier::B => "B",
            DriverTier::C => "C",
        }
    }
}

const DRIVER_TIERS: [(&str, DriverTier); 12] = [
    ("VER", DriverTier::S),
    ("LEC", DriverTier::A),
    ("NOR", DriverTier::A),
    ("HAM", DriverTier::A),
    ("SAI", DriverTier::A),
    ("ALO", DriverTier::A),
    ("PER", DriverTier::B),
    ("RUS", DriverTier::B),
    ("GAS", DriverTier::B),
    ("OCO", DriverTier::B),
    ("TSU", DriverTier::B),
    ("PIA", DriverTier::A),
];

/// Maps a three-letter driver code to its tier. Case-insensitive; anything
/// unknown (including the empty string) is tier C.
pub fn driver_to_tier(driver: &str) -> DriverTier {
    let code = driver.to_uppercase();
    DRIVER_TIERS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, tier)| *tier)
        .unwrap_or(DriverTier::C)
}
