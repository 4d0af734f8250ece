use crate::db::DatabaseError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
///
/// Variants serialize as their string value, so they can be used as JSON
/// map keys and inside the stored vaccination blob. `VALUES` lists every
/// accepted string, in declaration order, for validation rule tables.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const VALUES: &'static [&'static str] = &[$($s),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
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

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

str_enum!(YesNo {
    Oui => "Oui",
    Non => "Non",
});

str_enum!(Sex {
    Male => "M",
    Female => "F",
});

str_enum!(SickleType {
    Ss => "SS",
    Sc => "SC",
    SBetaZero => "Sβ⁰",
    SBetaPlus => "Sβ⁺",
    Other => "Autre",
});

str_enum!(AdministrationRoute {
    IntraDermal => "Intra dermique",
    IntraMuscular => "Intra musculaire",
    Oral => "Orale",
    Subcutaneous => "Sous cutanée",
});

// Expanded program on immunization (PEV) schedule, in calendar order.
str_enum!(VaccineCode {
    Bcg => "bcg",
    Vpo0 => "vpo0",
    DtcHepHib1 => "dtc_hep_hib_1",
    Pneumo13First => "pneumo_13_1",
    Vpo1 => "vpo_1",
    Rota1 => "rota_1",
    DtcHepHib2 => "dtc_hep_hib_2",
    Pneumo13Second => "pneumo_13_2",
    Vpo2 => "vpo_2",
    Rota2 => "rota_2",
    DtcHepHib3 => "dtc_hep_hib_3",
    Pneumo13Third => "pneumo_13_3",
    Vpo3 => "vpo_3",
    Rougeole1 => "rougeole_1",
    Rougeole2 => "rougeole_2",
    FievreJaune => "fievre_jaune",
});

impl VaccineCode {
    /// Label printed on the vaccination calendar and in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bcg => "BCG",
            Self::Vpo0 => "VPO-0",
            Self::DtcHepHib1 => "DTC-HepB+Hib 1",
            Self::Pneumo13First => "Pneumo-13 1",
            Self::Vpo1 => "VPO-1",
            Self::Rota1 => "ROTA 1",
            Self::DtcHepHib2 => "DTC-HepB+Hib 2",
            Self::Pneumo13Second => "Pneumo-13 2",
            Self::Vpo2 => "VPO-2",
            Self::Rota2 => "ROTA 2",
            Self::DtcHepHib3 => "DTC-HepB+Hib 3",
            Self::Pneumo13Third => "Pneumo-13 3",
            Self::Vpo3 => "VPO-3",
            Self::Rougeole1 => "Rougeole 1",
            Self::Rougeole2 => "Rougeole 2",
            Self::FievreJaune => "Fièvre Jaune",
        }
    }
}

str_enum!(RecordKind {
    Consultation => "consultations",
    Treatment => "consultation_treatments",
    Exam => "consultation_exams",
    Observation => "consultation_observations",
    Vaccination => "consultation_vaccinations",
});
