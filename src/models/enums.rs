use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr + Display pattern.
/// The string form is also the serde form.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
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

str_enum!(StageName {
    Intake => "intake_analysis",
    Refinement => "final_analysis",
    Treatment => "treatment_plan",
    Story => "patient_story",
    Conversation => "conversation_analysis",
});

str_enum!(PositionChangePain {
    NoPain => "no pain",
    Flexion => "flexion",
    Extension => "extension",
});

str_enum!(ActivityLevel {
    Inactive => "none",
    Light => "light",
    Moderate => "moderate",
    Heavy => "heavy",
});

str_enum!(PainTime {
    Morning => "AM",
    Evening => "PM",
});

impl StageName {
    pub const ALL: [StageName; 5] = [
        Self::Intake,
        Self::Refinement,
        Self::Treatment,
        Self::Story,
        Self::Conversation,
    ];

    /// Pipeline order: intake → refinement → treatment. Story and
    /// conversation analysis stand alone.
    pub fn previous(&self) -> Option<StageName> {
        match self {
            Self::Intake | Self::Story | Self::Conversation => None,
            Self::Refinement => Some(Self::Intake),
            Self::Treatment => Some(Self::Refinement),
        }
    }
}
