use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Sex {
    Male => "male",
    Female => "female",
});

str_enum!(RiskProfile {
    Healthy => "healthy",
    ModerateRisk => "moderate_risk",
    Pathological => "pathological",
});

impl RiskProfile {
    /// All profiles, ordered by increasing severity.
    pub fn all() -> &'static [RiskProfile] {
        &[Self::Healthy, Self::ModerateRisk, Self::Pathological]
    }

    /// Human-readable label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::ModerateRisk => "Moderate risk",
            Self::Pathological => "Established pathology",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sex_round_trip() {
        for (variant, s) in [(Sex::Male, "male"), (Sex::Female, "female")] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(Sex::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn risk_profile_round_trip() {
        for (variant, s) in [
            (RiskProfile::Healthy, "healthy"),
            (RiskProfile::ModerateRisk, "moderate_risk"),
            (RiskProfile::Pathological, "pathological"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(RiskProfile::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = Sex::from_str("N/B").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn profiles_ordered_by_severity() {
        let all = RiskProfile::all();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&RiskProfile::ModerateRisk).unwrap();
        assert_eq!(json, "\"moderate_risk\"");
    }
}
