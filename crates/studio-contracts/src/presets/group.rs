use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectCategory {
    #[default]
    Male,
    Female,
}

impl SubjectCategory {
    pub const ALL: [SubjectCategory; 2] = [SubjectCategory::Male, SubjectCategory::Female];

    pub fn as_str(self) -> &'static str {
        match self {
            SubjectCategory::Male => "male",
            SubjectCategory::Female => "female",
        }
    }
}

impl fmt::Display for SubjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectCategory {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" | "m" | "men" => Ok(SubjectCategory::Male),
            "female" | "f" | "women" => Ok(SubjectCategory::Female),
            other => Err(format!(
                "unknown subject category '{other}' (expected male or female)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleMode {
    #[default]
    Professional,
    Fashion,
}

impl StyleMode {
    pub const ALL: [StyleMode; 2] = [StyleMode::Professional, StyleMode::Fashion];

    pub fn as_str(self) -> &'static str {
        match self {
            StyleMode::Professional => "professional",
            StyleMode::Fashion => "fashion",
        }
    }

    /// Label used on the generate action ("Generate ID Photos").
    pub fn batch_label(self) -> &'static str {
        match self {
            StyleMode::Professional => "ID Photos",
            StyleMode::Fashion => "Fashion Looks",
        }
    }
}

impl fmt::Display for StyleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StyleMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "professional" | "pro" | "id" => Ok(StyleMode::Professional),
            "fashion" | "style" | "trendy" => Ok(StyleMode::Fashion),
            other => Err(format!(
                "unknown style mode '{other}' (expected professional or fashion)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylePreset {
    pub id: String,
    pub display_name: String,
    pub prompt_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetGroup {
    pub category: SubjectCategory,
    pub mode: StyleMode,
    pub presets: Vec<StylePreset>,
}

impl PresetGroup {
    pub fn key(&self) -> (SubjectCategory, StyleMode) {
        (self.category, self.mode)
    }

    pub fn get(&self, id: &str) -> Option<&StylePreset> {
        self.presets.iter().find(|preset| preset.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::{StyleMode, SubjectCategory};

    #[test]
    fn category_and_mode_parse_aliases() {
        assert_eq!("Female".parse::<SubjectCategory>(), Ok(SubjectCategory::Female));
        assert_eq!(" m ".parse::<SubjectCategory>(), Ok(SubjectCategory::Male));
        assert_eq!("pro".parse::<StyleMode>(), Ok(StyleMode::Professional));
        assert_eq!("FASHION".parse::<StyleMode>(), Ok(StyleMode::Fashion));
    }

    #[test]
    fn unknown_values_explain_expected_input() {
        let err = "robot".parse::<SubjectCategory>().unwrap_err();
        assert!(err.contains("expected male or female"));
        let err = "casual".parse::<StyleMode>().unwrap_err();
        assert!(err.contains("expected professional or fashion"));
    }

    #[test]
    fn defaults_select_male_professional() {
        assert_eq!(SubjectCategory::default(), SubjectCategory::Male);
        assert_eq!(StyleMode::default(), StyleMode::Professional);
        assert_eq!(StyleMode::Fashion.batch_label(), "Fashion Looks");
    }
}
