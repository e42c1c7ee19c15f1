use serde::{Deserialize, Serialize};

/// An independent evaluation axis, each backed by its own reviewer persona
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Coherence of the argument, causality, structure
    Logic,
    /// Coverage and level of detail
    Completeness,
    /// Novelty and distinctiveness of the approach
    Innovation,
    /// Technical feasibility, resource needs, delivery risk
    Feasibility,
    /// Generalist review across all aspects
    General,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Logic,
        Dimension::Completeness,
        Dimension::Innovation,
        Dimension::Feasibility,
        Dimension::General,
    ];

    /// Dimensions used when none are configured
    pub const DEFAULT_SET: [Dimension; 3] = [
        Dimension::Logic,
        Dimension::Completeness,
        Dimension::Feasibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Logic => "logic",
            Dimension::Completeness => "completeness",
            Dimension::Innovation => "innovation",
            Dimension::Feasibility => "feasibility",
            Dimension::General => "default",
        }
    }

    /// One-line description of what the reviewer looks at
    pub fn focus(&self) -> &'static str {
        match self {
            Dimension::Logic => "logical coherence: consistency of the argument, cause and effect, and overall structure",
            Dimension::Completeness => "completeness: coverage of every goal and constraint, with no important detail left out",
            Dimension::Innovation => "innovation: how novel and distinctive the solution is, and whether the novelty has practical value",
            Dimension::Feasibility => "feasibility: technical viability, resource requirements, and implementation risk",
            Dimension::General => "overall quality across logic, completeness, innovation, and feasibility",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "logic" | "logical-coherence" | "coherence" => Ok(Dimension::Logic),
            "completeness" => Ok(Dimension::Completeness),
            "innovation" => Ok(Dimension::Innovation),
            "feasibility" => Ok(Dimension::Feasibility),
            "default" | "general" => Ok(Dimension::General),
            other => Err(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("logic".parse::<Dimension>(), Ok(Dimension::Logic));
        assert_eq!("Logical-Coherence".parse::<Dimension>(), Ok(Dimension::Logic));
        assert_eq!("general".parse::<Dimension>(), Ok(Dimension::General));
        assert_eq!(" feasibility ".parse::<Dimension>(), Ok(Dimension::Feasibility));
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!("vibes".parse::<Dimension>(), Err("vibes".to_string()));
    }

    #[test]
    fn display_round_trips() {
        for dim in Dimension::ALL {
            assert_eq!(dim.to_string().parse::<Dimension>(), Ok(dim));
        }
    }
}
